//! Payload recovery from PNG carrier files.
//!
//! Segment hosts disguise media parts as PNG images. The payload is smuggled
//! either in a non-standard chunk with a known type tag, or appended raw after
//! the IEND chunk's CRC. Extraction is a pure function over the fetched bytes.

use thiserror::Error;

/// Fixed 8-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Default type tag of the non-standard chunk carrying the payload.
pub const DEFAULT_CHUNK_TAG: [u8; 4] = *b"seGB";

/// Type tag of the standard end-of-image chunk.
const IEND: [u8; 4] = *b"IEND";

/// Extraction failure; marks the affected segment failed, never the whole job.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    /// Input does not start with the PNG signature (or is shorter than it).
    #[error("not a PNG carrier")]
    NotAContainer,
    /// Valid signature, but no custom chunk and no trailing bytes anywhere.
    #[error("no payload found in carrier")]
    PayloadNotFound,
}

/// Parses a 4-character ASCII chunk tag (e.g. from config). `None` if the
/// string is not exactly 4 ASCII bytes.
pub fn parse_chunk_tag(s: &str) -> Option<[u8; 4]> {
    let b = s.as_bytes();
    if b.len() != 4 || !s.is_ascii() {
        return None;
    }
    let mut tag = [0u8; 4];
    tag.copy_from_slice(b);
    Some(tag)
}

/// Recovers the hidden payload from a PNG carrier, zero-copy.
///
/// Strategies, in order:
/// 1. Walk the chunk structure (4-byte big-endian length, 4-byte tag, data,
///    4-byte CRC; CRC contents are ignored). A chunk tagged `chunk_tag` wins
///    immediately and its data is the payload.
/// 2. At the IEND chunk, any bytes following its CRC up to end-of-input are
///    the payload. Empty trailing does not count as found.
/// 3. If the walk dead-ends (truncated or bogus chunk length), scan raw bytes
///    for the last `IEND` occurrence and take everything after its 4 CRC
///    bytes.
pub fn extract_payload(raw: &[u8], chunk_tag: [u8; 4]) -> Result<&[u8], ExtractError> {
    if raw.len() < PNG_SIGNATURE.len() || raw[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
        return Err(ExtractError::NotAContainer);
    }

    let n = raw.len();
    let mut i = PNG_SIGNATURE.len();
    while i + 8 <= n {
        let length = u32::from_be_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]) as usize;
        let tag = &raw[i + 4..i + 8];
        let data_start = i + 8;
        let data_end = match data_start.checked_add(length) {
            Some(e) if e <= n => e,
            // Length field runs past the input: structured walk dead-ends.
            _ => break,
        };
        if tag == chunk_tag {
            return Ok(&raw[data_start..data_end]);
        }
        if tag == IEND {
            let after_crc = data_end + 4;
            if after_crc < n {
                return Ok(&raw[after_crc..]);
            }
        }
        i = data_end + 4;
    }

    // Walk found nothing; last-resort raw scan for the final end marker.
    if let Some(idx) = rfind(raw, &IEND) {
        let after_crc = idx + IEND.len() + 4;
        if after_crc < n {
            return Ok(&raw[after_crc..]);
        }
    }
    Err(ExtractError::PayloadNotFound)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
