//! # Archive Stream
//!
//! Reading an archive stream into an [`Archive`] chain and writing filesystem paths out as
//! a new (or extended) archive.
//!
//! The stream is a sequence of 512-byte blocks: each entry is one header block followed by
//! its payload padded to a block boundary. The archive ends with at least two all-zero
//! blocks, and its total length is padded to a multiple of the 10240-byte record.

mod reader;
mod writer;

pub use reader::{read_archive, ArchiveReader};
pub use writer::{write_archive, ArchiveWriter};

use std::io::{self, Read};

/// Reads until `buf` is full or the stream ends, returning how many bytes were read.
pub(crate) fn read_fully<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut got = 0;
    while got < buf.len() {
        match reader.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(got)
}
