use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::archive::read_fully;
use crate::common::{Archive, Entry, EntryType, BLOCK_SIZE, RECORD_SIZE};
use crate::error::{Result, TarError};
use crate::header;
use crate::probe::{probe, NAME_LEN};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// A writer that appends filesystem paths to an archive stream.
///
/// Directories are expanded recursively (header first, then children in file-name order).
/// A path that was already archived during the same write is stored again as a hardlink
/// to itself, without payload.
pub struct ArchiveWriter<'a, W> {
    stream: &'a mut W,
    root: PathBuf,
    offset: u64,
    copy_buffer: Vec<u8>,
}

impl<'a, W: Write + Seek> ArchiveWriter<'a, W> {
    pub fn new(stream: &'a mut W) -> Self {
        Self {
            stream,
            root: PathBuf::from("."),
            offset: 0,
            copy_buffer: vec![0; COPY_BUFFER_SIZE],
        }
    }

    /// Resolves relative input paths against `root` instead of the working directory.
    /// Stored names are unaffected.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Writes `paths` after the entries already in `archive`, followed by the terminator.
    ///
    /// Returns the extended chain and the number of bytes written. On failure the chain,
    /// including the entries it came in with, is dropped: the offsets it would describe
    /// no longer match the stream.
    pub fn write<P: AsRef<Path>>(mut self, mut archive: Archive, paths: &[P]) -> Result<(Archive, u64)> {
        let entries = archive.entries();
        if entries.windows(2).any(|pair| pair[0].end() > pair[1].begin) {
            return Err(TarError::InvalidChain("entries overlap or are out of stream order"));
        }

        let start = match archive.end_offset() {
            Some(end) => {
                self.stream
                    .seek(SeekFrom::Start(end))
                    .map_err(|source| TarError::Seek { offset: end, source })?;
                end
            }
            None => self.stream.stream_position().map_err(TarError::Position)?,
        };
        self.offset = start;

        for path in paths {
            self.write_path(&mut archive, path.as_ref())?;
        }
        archive.mark_content_end(self.offset);
        self.write_end()?;
        self.stream.flush().map_err(|source| TarError::Stream { offset: self.offset, source })?;

        archive.clear_original_names();
        let written = self.offset - start;
        info!(entries = archive.len(), bytes = written, "archive written");
        Ok((archive, written))
    }

    fn write_path(&mut self, archive: &mut Archive, path: &Path) -> Result<()> {
        let mut entry = probe(&self.root, path)?;
        entry.begin = self.offset;

        if entry.entry_type == EntryType::Directory {
            if entry.name.last() != Some(&b'/') && entry.name.len() < NAME_LEN - 1 {
                entry.name.push(b'/');
            }
            self.write_header(&entry)?;
            archive.push(entry);

            for child in self.children(path)? {
                self.write_path(archive, &child)?;
            }
            return Ok(());
        }

        let repeated = (entry.entry_type.is_file() || entry.entry_type == EntryType::Symlink)
            && archive.find_original(path).is_some();
        if repeated {
            debug!(path = %path.display(), "already archived, storing as hardlink");
            entry.entry_type = EntryType::Hardlink;
            entry.link_name = entry.name.clone();
            entry.size = 0;
        }

        self.write_header(&entry)?;
        if entry.entry_type.is_file() {
            let source = self.root.join(path);
            self.copy_payload(&source, entry.size)?;
        }
        self.pad_payload(entry.size)?;
        archive.push(entry);
        Ok(())
    }

    /// Immediate children of the directory at `path`, as paths below `path`.
    fn children(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let dir = self.root.join(path);
        WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(|child| match child {
                Ok(child) => Ok(path.join(child.file_name())),
                Err(err) => {
                    let failed = err.path().map(Path::to_path_buf).unwrap_or_else(|| dir.clone());
                    Err(TarError::io(failed, io::Error::from(err)))
                }
            })
            .collect()
    }

    fn write_header(&mut self, entry: &Entry) -> Result<()> {
        let block = header::encode(entry);
        self.put(&block)?;
        debug!(name = %entry.name_lossy(), begin = entry.begin, entry_type = ?entry.entry_type, "wrote header");
        Ok(())
    }

    /// Streams exactly `size` bytes of the file at `path` into the archive.
    fn copy_payload(&mut self, path: &Path, size: u64) -> Result<()> {
        let mut file = File::open(path).map_err(|e| TarError::io(path, e))?;
        let mut copied: u64 = 0;
        while copied < size {
            let want = (size - copied).min(self.copy_buffer.len() as u64) as usize;
            let got = read_fully(&mut file, &mut self.copy_buffer[..want]).map_err(|e| TarError::io(path, e))?;
            if got != want {
                return Err(TarError::ShortTransfer {
                    path: path.to_path_buf(),
                    expected: size,
                    actual: copied + got as u64,
                });
            }
            self.stream
                .write_all(&self.copy_buffer[..got])
                .map_err(|source| TarError::Stream { offset: self.offset, source })?;
            self.offset += got as u64;
            copied += got as u64;
        }
        Ok(())
    }

    /// Zero-fills the payload of `size` bytes up to the next block boundary.
    fn pad_payload(&mut self, size: u64) -> Result<()> {
        match size % BLOCK_SIZE {
            0 => Ok(()),
            r => self.put_zeros(BLOCK_SIZE - r),
        }
    }

    /// Pads the archive to the end of the current record, appending a whole extra record
    /// when fewer than two zero blocks would fit.
    fn write_end(&mut self) -> Result<()> {
        let mut pad = RECORD_SIZE - self.offset % RECORD_SIZE;
        if pad < 2 * BLOCK_SIZE {
            pad += RECORD_SIZE;
        }
        self.put_zeros(pad)
    }

    fn put(&mut self, data: &[u8]) -> Result<()> {
        self.stream
            .write_all(data)
            .map_err(|source| TarError::Stream { offset: self.offset, source })?;
        self.offset += data.len() as u64;
        Ok(())
    }

    fn put_zeros(&mut self, len: u64) -> Result<()> {
        let copied = io::copy(&mut io::repeat(0).take(len), &mut *self.stream)
            .map_err(|source| TarError::Stream { offset: self.offset, source })?;
        self.offset += copied;
        Ok(())
    }
}

/// Appends `paths` to `stream` after the entries of `archive` (empty for a new archive)
/// and terminates the archive.
pub fn write_archive<W, P>(stream: &mut W, archive: Archive, paths: &[P]) -> Result<(Archive, u64)>
where
    W: Write + Seek,
    P: AsRef<Path>,
{
    ArchiveWriter::new(stream).write(archive, paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::read_archive;
    use crate::header::{decode, Decoded, RawBlock};
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn header_at(bytes: &[u8], offset: u64) -> Entry {
        let mut block: RawBlock = header::zero_block();
        block.copy_from_slice(&bytes[offset as usize..offset as usize + BLOCK_SIZE as usize]);
        match decode(&block) {
            Decoded::Entry(entry) => entry,
            Decoded::Zero => panic!("no header at {offset}"),
        }
    }

    #[test]
    fn writes_file_with_padding_and_terminator() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), b"hello world")?;

        let mut stream = Cursor::new(Vec::new());
        let (archive, written) = ArchiveWriter::new(&mut stream)
            .root(dir.path())
            .write(Archive::new(), &["a.txt"])?;

        let bytes = stream.into_inner();
        assert_eq!(written, bytes.len() as u64);
        assert_eq!(bytes.len() as u64, RECORD_SIZE);
        assert_eq!(&bytes[512..523], b"hello world");
        assert!(bytes[523..].iter().all(|b| *b == 0));

        assert_eq!(archive.len(), 1);
        assert_eq!(archive.entries()[0].name, b"a.txt");
        assert_eq!(archive.entries()[0].original_name, None);
        Ok(())
    }

    #[test]
    fn directory_is_expanded_in_pre_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("d/sub"))?;
        fs::write(dir.path().join("d/b.txt"), b"")?;
        fs::write(dir.path().join("d/a.txt"), b"aaa")?;
        fs::write(dir.path().join("d/sub/c.txt"), b"c")?;

        let mut stream = Cursor::new(Vec::new());
        let (archive, _) = ArchiveWriter::new(&mut stream)
            .root(dir.path())
            .write(Archive::new(), &["d"])?;

        let names: Vec<_> = archive.iter().map(|e| e.name_lossy().into_owned()).collect();
        assert_eq!(names, vec!["d/", "d/a.txt", "d/b.txt", "d/sub/", "d/sub/c.txt"]);
        assert_eq!(archive.entries()[0].size, 0);
        Ok(())
    }

    #[test]
    fn repeated_path_becomes_hardlink() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), b"hello world")?;

        let mut stream = Cursor::new(Vec::new());
        let (archive, _) = ArchiveWriter::new(&mut stream)
            .root(dir.path())
            .write(Archive::new(), &["a.txt", "a.txt"])?;

        let second = &archive.entries()[1];
        assert_eq!(second.entry_type, EntryType::Hardlink);
        assert_eq!(second.link_name, archive.entries()[0].name);
        assert_eq!(second.size, 0);
        // one header + one payload block, then the hardlink header
        assert_eq!(second.begin, 1024);

        let bytes = stream.into_inner();
        let on_disk = header_at(&bytes, 1024);
        assert_eq!(on_disk.entry_type, EntryType::Hardlink);
        assert_eq!(on_disk.size, 0);
        Ok(())
    }

    #[test]
    fn short_terminator_gets_extra_record() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        // header + 18 payload blocks leaves a single block in the record
        fs::write(dir.path().join("big"), vec![1u8; 18 * 512])?;

        let mut stream = Cursor::new(Vec::new());
        ArchiveWriter::new(&mut stream)
            .root(dir.path())
            .write(Archive::new(), &["big"])?;

        let bytes = stream.into_inner();
        assert_eq!(bytes.len() as u64, 2 * RECORD_SIZE);
        assert!(bytes[19 * 512..].iter().all(|b| *b == 0));
        Ok(())
    }

    #[test]
    fn append_continues_after_existing_entries() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), b"first")?;
        fs::write(dir.path().join("b.txt"), b"second")?;

        let mut stream = Cursor::new(Vec::new());
        ArchiveWriter::new(&mut stream)
            .root(dir.path())
            .write(Archive::new(), &["a.txt"])?;

        stream.set_position(0);
        let existing = read_archive(&mut stream)?;
        let (archive, written) = ArchiveWriter::new(&mut stream)
            .root(dir.path())
            .write(existing, &["b.txt"])?;

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.entries()[1].begin, 1024);
        assert_eq!(written, RECORD_SIZE - 1024);

        stream.set_position(0);
        let reread = read_archive(&mut stream)?;
        assert_eq!(reread, archive);
        Ok(())
    }

    #[test]
    fn append_to_archive_without_entries_overwrites_terminator() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), b"late")?;

        let mut stream = Cursor::new(Vec::new());
        ArchiveWriter::new(&mut stream).write::<&str>(Archive::new(), &[])?;
        assert_eq!(stream.get_ref().len() as u64, RECORD_SIZE);

        stream.set_position(0);
        let existing = read_archive(&mut stream)?;
        assert!(existing.is_empty());
        assert_eq!(existing.end_offset(), Some(0));
        assert_eq!(stream.position(), RECORD_SIZE);

        let (archive, written) = ArchiveWriter::new(&mut stream)
            .root(dir.path())
            .write(existing, &["a.txt"])?;
        assert_eq!(archive.entries()[0].begin, 0);
        assert_eq!(written, RECORD_SIZE);
        assert_eq!(stream.get_ref().len() as u64, RECORD_SIZE);

        stream.set_position(0);
        let reread = read_archive(&mut stream)?;
        assert_eq!(reread.len(), 1);
        assert_eq!(reread.entries()[0].name, b"a.txt");
        Ok(())
    }

    #[test]
    fn overlapping_chain_is_refused() -> Result<(), Box<dyn std::error::Error>> {
        let first = Entry { name: b"a".to_vec(), size: 600, ..Entry::default() };
        let second = Entry { name: b"b".to_vec(), begin: 512, ..Entry::default() };
        let archive = Archive::from(vec![first, second]);

        let mut stream = Cursor::new(Vec::new());
        let err = ArchiveWriter::new(&mut stream)
            .write::<&str>(archive, &[])
            .expect_err("second entry starts inside the first");
        assert!(matches!(err, TarError::InvalidChain(_)));
        assert!(stream.into_inner().is_empty());
        Ok(())
    }

    #[test]
    fn failure_drops_the_chain() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), b"x")?;

        let mut stream = Cursor::new(Vec::new());
        let err = ArchiveWriter::new(&mut stream)
            .root(dir.path())
            .write(Archive::new(), &["a.txt", "missing"])
            .expect_err("missing input");
        assert!(matches!(err, TarError::Stat { .. }));
        Ok(())
    }
}
