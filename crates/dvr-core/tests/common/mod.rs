//! Shared helpers for integration tests.

pub mod segment_server;

use dvr_core::carrier::PNG_SIGNATURE;

/// Builds a PNG carrier hiding `payload` in an ancillary chunk tagged
/// `tag`. Chunk CRCs are zeroed; extraction never checks them.
pub fn wrap_in_carrier(payload: &[u8], tag: [u8; 4]) -> Vec<u8> {
    let mut out = PNG_SIGNATURE.to_vec();
    push_chunk(&mut out, *b"IHDR", &[0u8; 13]);
    push_chunk(&mut out, tag, payload);
    push_chunk(&mut out, *b"IEND", &[]);
    out
}

fn push_chunk(out: &mut Vec<u8>, tag: [u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&tag);
    out.extend_from_slice(data);
    out.extend_from_slice(&[0, 0, 0, 0]);
}
