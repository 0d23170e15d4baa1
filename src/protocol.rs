//! Wire constants and fixed-width field encoding for the portcast transport
//!
//! The wire format is deliberately primitive: a 200-byte space-padded
//! header on the control channel, then per-chunk connections that carry a
//! 10-byte space-padded chunk id followed by raw bytes until close. The
//! receiving peer derives chunk boundaries from the byte count it reads
//! before EOF.

use crate::error::TransferError;

// Per-read buffer size. Also the write granularity on chunk connections.
pub const READ_BUF_SIZE: usize = 65536;

// Reads per chunk; READ_BUF_SIZE * BUFS_PER_CHUNK is the chunk width.
pub const BUFS_PER_CHUNK: u64 = 500;

// Chunk width in bytes (32 MB). A file of N bytes becomes ceil(N / CHUNK_BYTES)
// chunks, each streamed over its own connection.
pub const CHUNK_BYTES: u64 = READ_BUF_SIZE as u64 * BUFS_PER_CHUNK;

// Number of reusable chunk ports. Caps transfer concurrency.
pub const POOL_SIZE: u16 = 50;

// First chunk port; the pool spans [BASE_PORT, BASE_PORT + POOL_SIZE).
pub const BASE_PORT: u16 = 30000;

// Control-channel header width. "{size} {name}" left-justified, space-padded.
pub const HEADER_LEN: usize = 200;

// Chunk-id field width at the head of every chunk connection.
pub const CHUNK_ID_LEN: usize = 10;

// Default control-channel port for the CLI. Receivers dial this first.
pub const CONTROL_PORT: u16 = 29900;

/// Encode the control-channel header: `"{file_size} {file_name}"`
/// left-justified and space-padded to exactly [`HEADER_LEN`] bytes.
///
/// Overlong content is an error, never a truncation — a clipped header
/// would silently corrupt the advertised size or name.
pub fn encode_header(file_size: u64, file_name: &str) -> Result<[u8; HEADER_LEN], TransferError> {
    let msg = format!("{} {}", file_size, file_name);
    pad_field(&msg, "header")
}

/// Encode the 10-byte chunk id written first on every chunk connection.
pub fn encode_chunk_id(index: u64) -> Result<[u8; CHUNK_ID_LEN], TransferError> {
    pad_field(&index.to_string(), "chunk id")
}

fn pad_field<const W: usize>(msg: &str, field: &'static str) -> Result<[u8; W], TransferError> {
    if msg.len() > W {
        return Err(TransferError::FieldOverflow {
            field,
            width: W,
            need: msg.len(),
        });
    }
    let mut out = [b' '; W];
    out[..msg.len()].copy_from_slice(msg.as_bytes());
    Ok(out)
}

/// Decode a header the way a receiver would: trim trailing padding, split
/// on the first space. Used by tests; receiver-side decode is otherwise
/// out of scope for the sender.
pub fn decode_header(raw: &[u8; HEADER_LEN]) -> Option<(u64, String)> {
    let text = std::str::from_utf8(raw).ok()?;
    let trimmed = text.trim_end_matches(' ');
    let (size, name) = trimmed.split_once(' ')?;
    Some((size.parse::<u64>().ok()?, name.to_string()))
}
