//! # Extraction Module
//!
//! Replays an [`Archive`] chain against the filesystem: directories, regular files (with
//! their data copied out of the archive stream), symlinks, hardlinks, device nodes and
//! named pipes. It also renders the chain as a listing.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, warn};

use crate::archive::read_fully;
use crate::common::{Archive, Entry, EntryType, BLOCK_SIZE, DEFAULT_DIR_MODE};
use crate::error::{Result, TarError};
use crate::fsx;

/// What an extraction run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Entries materialized on the filesystem (including ones that already existed).
    pub extracted: usize,
    /// Entries left out because they were not selected or have an unknown type.
    pub skipped: usize,
}

/// Materializes archive entries below a destination directory.
pub struct Extractor<'a, R> {
    stream: &'a mut R,
    root: PathBuf,
}

impl<'a, R: Read + Seek> Extractor<'a, R> {
    pub fn new(stream: &'a mut R) -> Self {
        Self { stream, root: PathBuf::from(".") }
    }

    /// Extracts below `root` instead of the working directory.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Extracts the entries of `archive` whose name equals one of `selected`, or every
    /// entry when `selected` is empty.
    ///
    /// A failing entry is logged and does not stop the others; if any failed, the result is
    /// [`TarError::Extract`] with the count.
    pub fn extract<S: AsRef<[u8]>>(mut self, archive: &Archive, selected: &[S]) -> Result<ExtractSummary> {
        let mut summary = ExtractSummary::default();
        let mut failed = 0;

        if selected.is_empty() {
            self.seek(0)?;
        }

        for entry in archive {
            if !selected.is_empty() {
                if !selected.iter().any(|name| name.as_ref() == entry.name.as_slice()) {
                    summary.skipped += 1;
                    continue;
                }
                self.seek(entry.begin)?;
            }

            if let EntryType::Unknown(flag) = entry.entry_type {
                warn!(name = %entry.name_lossy(), flag, "skipping entry of unsupported type");
                summary.skipped += 1;
                continue;
            }

            match self.extract_entry(entry) {
                Ok(()) => summary.extracted += 1,
                Err(e) => {
                    error!(name = %entry.name_lossy(), "{}", e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(TarError::Extract { failed, total: summary.extracted + failed });
        }
        Ok(summary)
    }

    fn extract_entry(&mut self, entry: &Entry) -> Result<()> {
        if entry.name.is_empty() {
            return Err(TarError::EmptyName);
        }
        let target = self.target_path(entry.path())?;
        debug!(name = %entry.name_lossy(), entry_type = ?entry.entry_type, "extracting");

        match entry.entry_type {
            EntryType::Normal | EntryType::Regular | EntryType::Contiguous => {
                create_parent(&target)?;
                self.extract_file(entry, &target)
            }
            EntryType::CharDevice | EntryType::BlockDevice => {
                create_parent(&target)?;
                let kind = if entry.entry_type == EntryType::CharDevice {
                    libc::S_IFCHR
                } else {
                    libc::S_IFBLK
                };
                keep_existing(
                    fsx::mknod(&target, kind, entry.mode, entry.major, entry.minor)
                        .map_err(|e| TarError::io(&target, e)),
                )
            }
            EntryType::Hardlink => {
                create_parent(&target)?;
                let source = self.target_path(entry.link_path())?;
                keep_existing(fs::hard_link(&source, &target).map_err(|e| TarError::io(&target, e)))
            }
            EntryType::Symlink => {
                create_parent(&target)?;
                keep_existing(
                    std::os::unix::fs::symlink(entry.link_path(), &target)
                        .map_err(|e| TarError::io(&target, e)),
                )
            }
            EntryType::Directory => fsx::create_dir_recursive(&target, entry.mode & 0o777)
                .map_err(|(path, e)| TarError::io(path, e)),
            EntryType::Fifo => {
                create_parent(&target)?;
                keep_existing(fsx::mkfifo(&target, entry.mode).map_err(|e| TarError::io(&target, e)))
            }
            EntryType::Unknown(_) => Ok(()),
        }
    }

    /// Creates (or truncates) the file and copies its payload out of the archive.
    fn extract_file(&mut self, entry: &Entry, target: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(entry.mode & 0o777)
            .custom_flags(libc::O_NOFOLLOW)
            .open(target)
            .map_err(|e| TarError::io(target, e))?;

        if entry.size == 0 {
            return Ok(());
        }
        self.seek(entry.begin + BLOCK_SIZE)?;

        let mut buf = [0u8; BLOCK_SIZE as usize];
        let mut copied: u64 = 0;
        while copied < entry.size {
            let want = (entry.size - copied).min(BLOCK_SIZE) as usize;
            let got = read_fully(&mut *self.stream, &mut buf[..want]).map_err(|source| TarError::Stream {
                offset: entry.begin + BLOCK_SIZE + copied,
                source,
            })?;
            if got != want {
                return Err(TarError::ShortTransfer {
                    path: target.to_path_buf(),
                    expected: entry.size,
                    actual: copied + got as u64,
                });
            }
            file.write_all(&buf[..got]).map_err(|e| TarError::io(target, e))?;
            copied += got as u64;
        }
        Ok(())
    }

    /// Maps an entry name below the extraction root.
    ///
    /// `..` components are refused, and so is a name whose parent directories below the
    /// root already exist as symlinks: writing through one could land outside the root.
    fn target_path(&self, name: &Path) -> Result<PathBuf> {
        let mut parts = Vec::new();
        for component in name.components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::ParentDir => return Err(TarError::PathTraversal(name.to_path_buf())),
                Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            }
        }

        let mut target = self.root.clone();
        let Some((last, parents)) = parts.split_last() else {
            return Ok(target);
        };
        for part in parents {
            target.push(part);
            if let Ok(meta) = fs::symlink_metadata(&target) {
                if meta.file_type().is_symlink() {
                    return Err(TarError::PathTraversal(name.to_path_buf()));
                }
            }
        }
        target.push(last);
        Ok(target)
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.stream
            .seek(SeekFrom::Start(offset))
            .map_err(|source| TarError::Seek { offset, source })?;
        Ok(())
    }
}

fn create_parent(target: &Path) -> Result<()> {
    match target.parent() {
        Some(parent) => {
            fsx::create_dir_recursive(parent, DEFAULT_DIR_MODE).map_err(|(path, e)| TarError::io(path, e))
        }
        None => Ok(()),
    }
}

/// Special files are never replaced: finding one already in place counts as success.
fn keep_existing(result: Result<()>) -> Result<()> {
    match result {
        Err(TarError::AlreadyExists { path }) => {
            debug!(path = %path.display(), "already exists, keeping it");
            Ok(())
        }
        other => other,
    }
}

/// Extracts `selected` entries of `archive` (all when empty) into the working directory.
pub fn extract_archive<R, S>(stream: &mut R, archive: &Archive, selected: &[S]) -> Result<ExtractSummary>
where
    R: Read + Seek,
    S: AsRef<[u8]>,
{
    Extractor::new(stream).extract(archive, selected)
}

/// Renders `mode` permission bits the way `ls -l` does, prefixed by the type symbol.
fn mode_string(entry_type: EntryType, mode: u32) -> String {
    let mut out = String::with_capacity(10);
    out.push(entry_type.symbol());
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// One listing line for `entry`; `verbose` adds type, mode, ownership, size and mtime.
pub fn describe(entry: &Entry, verbose: bool) -> String {
    let name = entry.name_lossy();
    if !verbose {
        return name.into_owned();
    }

    let mtime = i64::try_from(entry.mtime)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "????-??-?? ??:??".to_string());
    let size = if entry.entry_type.is_device() {
        format!("{},{}", entry.major, entry.minor)
    } else {
        entry.size.to_string()
    };

    let mut line = format!(
        "{} {}/{} {:>8} {} {}",
        mode_string(entry.entry_type, entry.mode),
        String::from_utf8_lossy(&entry.owner),
        String::from_utf8_lossy(&entry.group),
        size,
        mtime,
        name,
    );
    match entry.entry_type {
        EntryType::Symlink => {
            line.push_str(" -> ");
            line.push_str(&String::from_utf8_lossy(&entry.link_name));
        }
        EntryType::Hardlink => {
            line.push_str(" link to ");
            line.push_str(&String::from_utf8_lossy(&entry.link_name));
        }
        _ => {}
    }
    line
}

/// Writes one line per entry of `archive` to `out`.
pub fn list_entries<W: Write>(archive: &Archive, verbose: bool, out: &mut W) -> io::Result<()> {
    for entry in archive {
        writeln!(out, "{}", describe(entry, verbose))?;
    }
    Ok(())
}
