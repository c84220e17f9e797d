//! Filling an [`Entry`] from `lstat` on a path.

use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;

use tracing::trace;

use crate::common::{Entry, EntryType};
use crate::error::{Result, TarError};
use crate::fsx;

/// Longest name or link target a header can hold.
pub const NAME_LEN: usize = 100;

/// Name stored when the user or group database has no entry.
const FALLBACK_NAME: &[u8] = b"None";

/// Strips one leading `/`, `./` or `../` from `path`.
pub fn strip_relative_prefix(path: &[u8]) -> &[u8] {
    path.strip_prefix(b"/")
        .or_else(|| path.strip_prefix(b"./"))
        .or_else(|| path.strip_prefix(b"../"))
        .unwrap_or(path)
}

fn truncated(bytes: &[u8]) -> Vec<u8> {
    bytes[..bytes.len().min(NAME_LEN)].to_vec()
}

/// Stats `path` (resolved against `root` when relative) without following symlinks and
/// describes it as an archive entry.
///
/// The stored name is `path` minus one leading `/`, `./` or `../`; the path itself is kept
/// in `original_name`. `begin` is left at zero.
pub fn probe(root: &Path, path: &Path) -> Result<Entry> {
    let full = root.join(path);
    let meta = fs::symlink_metadata(&full).map_err(|source| TarError::Stat {
        path: full.clone(),
        source,
    })?;

    let raw_name = path.as_os_str().as_bytes();
    let mut entry = Entry {
        name: truncated(strip_relative_prefix(raw_name)),
        original_name: Some(path.to_path_buf()),
        mode: meta.mode() & 0o777,
        uid: u64::from(meta.uid()),
        gid: u64::from(meta.gid()),
        size: meta.size(),
        mtime: u64::try_from(meta.mtime()).unwrap_or(0),
        owner: fsx::user_name(meta.uid()).unwrap_or_else(|| FALLBACK_NAME.to_vec()),
        group: fsx::group_name(meta.gid()).unwrap_or_else(|| FALLBACK_NAME.to_vec()),
        ..Entry::default()
    };

    let file_type = meta.file_type();
    if file_type.is_file() {
        entry.entry_type = EntryType::Normal;
    } else if file_type.is_symlink() {
        entry.entry_type = EntryType::Symlink;
        entry.size = 0;
        let target = fs::read_link(&full).map_err(|source| TarError::LinkRead {
            path: full.clone(),
            source,
        })?;
        entry.link_name = truncated(target.as_os_str().as_bytes());
    } else if file_type.is_char_device() || file_type.is_block_device() {
        entry.entry_type = if file_type.is_char_device() {
            EntryType::CharDevice
        } else {
            EntryType::BlockDevice
        };
        entry.size = 0;
        (entry.major, entry.minor) = fsx::split_dev(meta.rdev());
    } else if file_type.is_dir() {
        entry.entry_type = EntryType::Directory;
        entry.size = 0;
    } else if file_type.is_fifo() {
        entry.entry_type = EntryType::Fifo;
        entry.size = 0;
    } else if file_type.is_socket() {
        return Err(TarError::UnsupportedType { path: full, kind: "socket" });
    } else {
        return Err(TarError::UnsupportedType { path: full, kind: "unknown" });
    }

    trace!(path = %full.display(), entry_type = ?entry.entry_type, size = entry.size, "probed");
    Ok(entry)
}
