//! # wytar Core Library
//!
//! Reading, writing and extracting ustar archives.
//!
//! An archive is held in memory as an [`Archive`]: the ordered chain of [`Entry`] headers
//! found in (or written to) a stream, each remembering the byte offset of its header.
//! Payloads are never buffered; they are streamed from the filesystem on write and read
//! back from the archive stream on extraction.
//!
//! ## Key Modules
//!
//! - [`archive`]: Parses an archive stream into a chain and writes paths out as a new or
//!   extended archive.
//! - [`header`]: Encodes and decodes the 512-byte header block.
//! - [`extract`]: Materializes entries on the filesystem and renders listings.
//! - [`probe`]: Builds an entry from a filesystem object.
//!
//! ## Examples
//!
//! ```no_run
//! use std::fs::File;
//!
//! let mut out = File::create("out.tar")?;
//! let (archive, _) = wytar::write_archive(&mut out, wytar::Archive::new(), &["a.txt", "d"])?;
//! assert_eq!(archive.entries()[0].name, b"a.txt");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod archive;
pub mod cli;
pub mod common;
pub mod error;
pub mod extract;
pub mod header;
pub mod probe;

// Unix filesystem primitives not covered by std
pub mod fsx;

pub use archive::{read_archive, write_archive, ArchiveReader, ArchiveWriter};
pub use common::{Archive, Entry, EntryType};
pub use error::{Result, TarError};
pub use extract::{extract_archive, list_entries, ExtractSummary, Extractor};
