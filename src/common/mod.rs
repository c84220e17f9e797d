//! Common types shared by the reader, the writer and the extractor.
//!
//! An archive is kept in memory as an ordered chain of [`Entry`] descriptors, one per
//! archived filesystem object, in the order their headers appear in the stream.

use std::borrow::Cow;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Size of a header block and the unit payloads are padded to.
pub const BLOCK_SIZE: u64 = 512;

/// Size of a record, the unit the archive end is padded to (20 blocks).
pub const RECORD_SIZE: u64 = 20 * BLOCK_SIZE;

/// Mode used for directories created on demand during extraction.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Rounds `value` up to the next multiple of `unit`.
pub fn ceil_to_multiple_of(value: u64, unit: u64) -> u64 {
    match value % unit {
        0 => value,
        r => value + (unit - r),
    }
}

/// The type of an archived filesystem object, with its ustar type flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Normal,
    Regular,
    Hardlink,
    Symlink,
    CharDevice,
    BlockDevice,
    Directory,
    Fifo,
    Contiguous,
    /// A type flag this implementation does not handle (e.g. pax or GNU extensions).
    Unknown(u8),
}

impl EntryType {
    pub fn from_flag(flag: u8) -> Self {
        match flag {
            b'\0' => EntryType::Normal,
            b'0' => EntryType::Regular,
            b'1' => EntryType::Hardlink,
            b'2' => EntryType::Symlink,
            b'3' => EntryType::CharDevice,
            b'4' => EntryType::BlockDevice,
            b'5' => EntryType::Directory,
            b'6' => EntryType::Fifo,
            b'7' => EntryType::Contiguous,
            other => EntryType::Unknown(other),
        }
    }

    pub fn flag(self) -> u8 {
        match self {
            EntryType::Normal => b'\0',
            EntryType::Regular => b'0',
            EntryType::Hardlink => b'1',
            EntryType::Symlink => b'2',
            EntryType::CharDevice => b'3',
            EntryType::BlockDevice => b'4',
            EntryType::Directory => b'5',
            EntryType::Fifo => b'6',
            EntryType::Contiguous => b'7',
            EntryType::Unknown(other) => other,
        }
    }

    /// True for the types whose payload is file content.
    pub fn is_file(self) -> bool {
        matches!(self, EntryType::Normal | EntryType::Regular | EntryType::Contiguous)
    }

    pub fn is_device(self) -> bool {
        matches!(self, EntryType::CharDevice | EntryType::BlockDevice)
    }

    /// Single character used by verbose listings, in the style of `ls -l`.
    pub fn symbol(self) -> char {
        match self {
            EntryType::Normal | EntryType::Regular | EntryType::Contiguous => '-',
            EntryType::Hardlink => 'h',
            EntryType::Symlink => 'l',
            EntryType::CharDevice => 'c',
            EntryType::BlockDevice => 'b',
            EntryType::Directory => 'd',
            EntryType::Fifo => 'p',
            EntryType::Unknown(_) => '?',
        }
    }
}

impl Default for EntryType {
    fn default() -> Self {
        EntryType::Normal
    }
}

/// Metadata for a single archived filesystem object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    /// Path relative to the archive root, at most 100 bytes on disk.
    pub name: Vec<u8>,
    /// The path as handed to the writer. Only used to detect repeated inputs while writing;
    /// cleared once the write completes.
    pub original_name: Option<PathBuf>,
    pub entry_type: EntryType,
    /// Permission bits.
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    /// Payload length in bytes.
    pub size: u64,
    /// Modification time in seconds since the epoch.
    pub mtime: u64,
    /// Link target for symlinks and hardlinks.
    pub link_name: Vec<u8>,
    pub owner: Vec<u8>,
    pub group: Vec<u8>,
    pub major: u32,
    pub minor: u32,
    /// Byte offset of this entry's header within the archive stream.
    pub begin: u64,
}

impl Entry {
    /// The entry name as a path.
    pub fn path(&self) -> &Path {
        Path::new(OsStr::from_bytes(&self.name))
    }

    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn link_path(&self) -> &Path {
        Path::new(OsStr::from_bytes(&self.link_name))
    }

    /// Number of payload bytes following the header, including block padding.
    pub fn padded_size(&self) -> u64 {
        ceil_to_multiple_of(self.size, BLOCK_SIZE)
    }

    /// Offset of the first byte past this entry's padded payload.
    pub fn end(&self) -> u64 {
        self.begin + BLOCK_SIZE + self.padded_size()
    }
}

/// An archive held in memory: the ordered chain of its entries.
///
/// The chain only ever grows by appending; dropping the archive releases every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: Vec<Entry>,
    /// Where the entries stop in the stream (the terminator's first block), once known.
    content_end: Option<u64>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
        self.content_end = None;
    }

    /// Finds the first entry that was created from `path`.
    pub fn find_original(&self, path: &Path) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.original_name.as_deref() == Some(path))
    }

    /// Finds the first entry stored under `name`.
    pub fn find(&self, name: &[u8]) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Offset where new entries may be appended.
    ///
    /// For a chain read from or written to a stream this is where its terminator starts,
    /// even when there are no entries. Otherwise it is the end of the last entry's payload.
    pub fn end_offset(&self) -> Option<u64> {
        self.content_end.or_else(|| self.entries.last().map(Entry::end))
    }

    pub(crate) fn mark_content_end(&mut self, offset: u64) {
        self.content_end = Some(offset);
    }

    pub(crate) fn clear_original_names(&mut self) {
        for entry in &mut self.entries {
            entry.original_name = None;
        }
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Archive {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl From<Vec<Entry>> for Archive {
    fn from(entries: Vec<Entry>) -> Self {
        Self { entries, content_end: None }
    }
}
