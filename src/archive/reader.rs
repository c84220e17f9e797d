use std::io::{Read, Seek, SeekFrom};

use tracing::{debug, warn};

use crate::archive::read_fully;
use crate::common::{ceil_to_multiple_of, Archive, BLOCK_SIZE, RECORD_SIZE};
use crate::error::{Result, TarError};
use crate::header::{self, Decoded, RawBlock};

/// Parses an archive stream into an [`Archive`] chain.
///
/// Only headers are read; payloads are skipped by seeking, and each entry remembers the
/// offset of its header so the extractor can come back for the data.
pub struct ArchiveReader<'a, R> {
    stream: &'a mut R,
    offset: u64,
}

impl<'a, R: Read + Seek> ArchiveReader<'a, R> {
    pub fn new(stream: &'a mut R) -> Self {
        Self { stream, offset: 0 }
    }

    /// Reads headers from the current stream position until the terminator.
    ///
    /// Two consecutive zero blocks end the archive; the stream is then left at the end of
    /// the record holding them, and the chain remembers where the first of them starts. A single zero block followed by a header is skipped as
    /// padding. A stream that ends without a terminator is accepted as complete.
    pub fn read(mut self) -> Result<Archive> {
        self.offset = self.stream.stream_position().map_err(TarError::Position)?;

        let mut archive = Archive::new();
        let mut pending: Option<RawBlock> = None;

        loop {
            let block = match pending.take() {
                Some(block) => block,
                None => match self.next_block()? {
                    Some(block) => block,
                    None => break,
                },
            };

            let mut entry = match header::decode(&block) {
                Decoded::Entry(entry) => entry,
                Decoded::Zero => match self.next_block()? {
                    None => break,
                    Some(next) if header::is_zero(&next) => {
                        let end = ceil_to_multiple_of(self.offset + 2 * BLOCK_SIZE, RECORD_SIZE);
                        self.seek(end)?;
                        break;
                    }
                    Some(next) => {
                        debug!(offset = self.offset, "skipping lone zero block");
                        self.offset += BLOCK_SIZE;
                        pending = Some(next);
                        continue;
                    }
                },
            };

            entry.begin = self.offset;
            self.offset = entry.end();
            self.seek(self.offset)?;

            debug!(name = %entry.name_lossy(), begin = entry.begin, size = entry.size, "read entry");
            archive.push(entry);
        }

        archive.mark_content_end(self.offset);
        debug!(entries = archive.len(), content_end = self.offset, "archive read");
        Ok(archive)
    }

    /// Reads one block. `None` at end of stream; a trailing partial block counts as end of
    /// stream too.
    fn next_block(&mut self) -> Result<Option<RawBlock>> {
        let mut block = header::zero_block();
        let got = read_fully(&mut *self.stream, &mut block).map_err(|source| TarError::Stream {
            offset: self.offset,
            source,
        })?;
        match got {
            0 => {
                debug!(offset = self.offset, "end of stream without terminator");
                Ok(None)
            }
            n if n < block.len() => {
                warn!(offset = self.offset, bytes = n, "ignoring truncated block at end of stream");
                Ok(None)
            }
            _ => Ok(Some(block)),
        }
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.stream
            .seek(SeekFrom::Start(offset))
            .map_err(|source| TarError::Seek { offset, source })?;
        Ok(())
    }
}

/// Reads every entry header of `stream`, starting at its current position.
///
/// The number of entries is `archive.len()`.
pub fn read_archive<R: Read + Seek>(stream: &mut R) -> Result<Archive> {
    ArchiveReader::new(stream).read()
}
