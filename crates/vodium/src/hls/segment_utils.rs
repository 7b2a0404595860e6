// Helpers shared by the segment processor and the staging store.

use bytes::Bytes;
use memchr::memchr;

/// First byte of every MPEG transport-stream packet.
pub const TS_SYNC_BYTE: u8 = 0x47;

pub const STAGED_SEGMENT_EXTENSION: &str = "ts";

/// Drops everything before the first sync byte. `None` if there is no sync byte at all.
pub fn trim_to_sync_byte(data: Bytes) -> Option<Bytes> {
    let offset = memchr(TS_SYNC_BYTE, &data)?;
    Some(data.slice(offset..))
}

/// Fixed-width file name so that lexicographic order equals ordinal order.
pub fn staged_file_name(ordinal: u32) -> String {
    format!("{ordinal:05}.{STAGED_SEGMENT_EXTENSION}")
}

/// Inverse of [`staged_file_name`].
pub fn ordinal_from_file_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(STAGED_SEGMENT_EXTENSION)?.strip_suffix('.')?;
    if stem.len() != 5 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok().filter(|ordinal| *ordinal > 0)
}
