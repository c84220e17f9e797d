//! Conversion between the 512-byte ustar header block and [`Entry`].
//!
//! Field layout (offset, width):
//!
//! | field     | offset | width | encoding                 |
//! |-----------|--------|-------|--------------------------|
//! | name      | 0      | 100   | ASCII, NUL-padded        |
//! | mode      | 100    | 8     | 7 octal digits, NUL      |
//! | uid       | 108    | 8     | 7 octal digits, NUL      |
//! | gid       | 116    | 8     | 7 octal digits, NUL      |
//! | size      | 124    | 12    | 11 octal digits, NUL     |
//! | mtime     | 136    | 12    | 11 octal digits, NUL     |
//! | checksum  | 148    | 8     | written, never verified  |
//! | type flag | 156    | 1     | see [`EntryType`]        |
//! | link name | 157    | 100   | ASCII, NUL-padded        |
//! | magic     | 257    | 8     | `"ustar  \0"`            |
//! | owner     | 265    | 32    | ASCII, NUL-terminated    |
//! | group     | 297    | 32    | ASCII, NUL-terminated    |
//! | dev major | 329    | 8     | 7 octal digits, NUL      |
//! | dev minor | 337    | 8     | 7 octal digits, NUL      |

use std::ops::Range;

use crate::common::{Entry, EntryType, BLOCK_SIZE};

/// A raw header block.
pub type RawBlock = [u8; BLOCK_SIZE as usize];

/// The magic and version signature written into every header.
pub const USTAR_MAGIC: &[u8; 8] = b"ustar  \0";

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHECKSUM: Range<usize> = 148..156;
const TYPE_FLAG: usize = 156;
const LINK_NAME: Range<usize> = 157..257;
const MAGIC: Range<usize> = 257..265;
const OWNER: Range<usize> = 265..297;
const GROUP: Range<usize> = 297..329;
const DEV_MAJOR: Range<usize> = 329..337;
const DEV_MINOR: Range<usize> = 337..345;

// Number of octal digits stored in each numeric field.
const SHORT_DIGITS: usize = 7;
const LONG_DIGITS: usize = 11;

/// The result of decoding one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The block is entirely zero.
    Zero,
    Entry(Entry),
}

/// Creates a new all-zero block.
pub const fn zero_block() -> RawBlock {
    [0; BLOCK_SIZE as usize]
}

pub fn is_zero(block: &[u8]) -> bool {
    block.iter().all(|b| *b == 0)
}

/// Interprets a header block. Never fails: malformed numeric fields decode to whatever
/// prefix of valid octal digits they start with.
///
/// The returned entry has `begin` set to zero; the reader fills it in.
pub fn decode(block: &RawBlock) -> Decoded {
    if is_zero(block) {
        return Decoded::Zero;
    }

    let entry_type = EntryType::from_flag(block[TYPE_FLAG]);
    Decoded::Entry(Entry {
        name: text_field(&block[NAME]),
        original_name: None,
        entry_type,
        mode: parse_octal(&block[MODE], SHORT_DIGITS) as u32,
        uid: parse_octal(&block[UID], SHORT_DIGITS),
        gid: parse_octal(&block[GID], SHORT_DIGITS),
        size: parse_octal(&block[SIZE], LONG_DIGITS),
        mtime: parse_octal(&block[MTIME], LONG_DIGITS),
        link_name: text_field(&block[LINK_NAME]),
        owner: text_field(&block[OWNER]),
        group: text_field(&block[GROUP]),
        major: parse_octal(&block[DEV_MAJOR], SHORT_DIGITS) as u32,
        minor: parse_octal(&block[DEV_MINOR], SHORT_DIGITS) as u32,
        begin: 0,
    })
}

/// Serializes `entry` into a header block.
///
/// Text fields longer than their field are cut off silently, as classic tar does.
pub fn encode(entry: &Entry) -> RawBlock {
    let mut block = zero_block();

    put_text(&mut block[NAME], &entry.name);
    put_octal(&mut block[MODE], SHORT_DIGITS, u64::from(entry.mode));
    put_octal(&mut block[UID], SHORT_DIGITS, entry.uid);
    put_octal(&mut block[GID], SHORT_DIGITS, entry.gid);
    put_octal(&mut block[SIZE], LONG_DIGITS, entry.size);
    put_octal(&mut block[MTIME], LONG_DIGITS, entry.mtime);
    block[TYPE_FLAG] = entry.entry_type.flag();
    put_text(&mut block[LINK_NAME], &entry.link_name);
    block[MAGIC].copy_from_slice(USTAR_MAGIC);

    // owner and group always keep a terminating NUL
    put_text(&mut block[OWNER.start..OWNER.end - 1], &entry.owner);
    put_text(&mut block[GROUP.start..GROUP.end - 1], &entry.group);

    if entry.entry_type.is_device() {
        put_octal(&mut block[DEV_MAJOR], SHORT_DIGITS, u64::from(entry.major));
        put_octal(&mut block[DEV_MINOR], SHORT_DIGITS, u64::from(entry.minor));
    }

    let checksum = format!("{:06o}\0 ", checksum(&block));
    block[CHECKSUM].copy_from_slice(&checksum.as_bytes()[..CHECKSUM.len()]);
    block
}

/// Sum of all header bytes with the checksum field counted as spaces.
pub fn checksum(block: &RawBlock) -> u64 {
    block
        .iter()
        .enumerate()
        .map(|(i, b)| if CHECKSUM.contains(&i) { u64::from(b' ') } else { u64::from(*b) })
        .sum()
}

/// Reads octal digits left to right, stopping at the first byte that is not `'0'..='7'`
/// (including NUL) or after `digits` bytes.
pub fn parse_octal(field: &[u8], digits: usize) -> u64 {
    field
        .iter()
        .take(digits)
        .take_while(|b| (b'0'..=b'7').contains(*b))
        .fold(0u64, |value, b| (value << 3) | u64::from(b - b'0'))
}

/// Writes `value` as zero-padded octal of `digits` characters. A value needing more digits
/// keeps its leading ones.
fn put_octal(field: &mut [u8], digits: usize, value: u64) {
    let text = format!("{:0width$o}", value, width = digits);
    let len = digits.min(field.len());
    field[..len].copy_from_slice(&text.as_bytes()[..len]);
    field[len..].fill(0);
}

fn put_text(field: &mut [u8], text: &[u8]) {
    let len = text.len().min(field.len());
    field[..len].copy_from_slice(&text[..len]);
    field[len..].fill(0);
}

fn text_field(field: &[u8]) -> Vec<u8> {
    let nul = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    field[..nul].to_vec()
}
