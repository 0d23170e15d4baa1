//! Chunk partitioning and the per-chunk file reader.
//!
//! A chunk is a contiguous byte range of the source file, transferred over
//! one dedicated connection. Each [`ChunkReader`] opens its own file handle
//! positioned at the chunk's offset, so any number of readers can run
//! concurrently over disjoint ranges.

use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::TransferError;
use crate::protocol::READ_BUF_SIZE;

/// One byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based dispatch order; also the id written on the wire.
    pub index: u64,
    /// Byte offset into the file: `index * width`.
    pub offset: u64,
    /// Bytes in this chunk. Equals the chunk width except possibly for the
    /// last chunk.
    pub len: u64,
}

/// Partition `[0, file_size)` into chunks of `width` bytes.
///
/// The chunk count is `ceil(file_size / width)`; an empty file yields an
/// empty plan. The lengths always sum back to `file_size`.
pub fn partition(file_size: u64, width: u64) -> Vec<Chunk> {
    assert!(width > 0, "chunk width must be positive");
    let count = file_size.div_ceil(width);
    (0..count)
        .map(|index| {
            let offset = index * width;
            Chunk {
                index,
                offset,
                len: width.min(file_size - offset),
            }
        })
        .collect()
}

/// Finite, non-restartable source of one chunk's bytes.
///
/// Yields buffers of at most [`READ_BUF_SIZE`] bytes until the chunk length
/// is exhausted or the file ends early (a short or empty read ends the
/// sequence — the file may have been truncated under us).
pub struct ChunkReader {
    file: File,
    index: u64,
    remaining: u64,
}

impl ChunkReader {
    /// Open an independent handle on `path`, seeked to the chunk's offset.
    pub async fn open(path: &Path, chunk: &Chunk) -> Result<Self, TransferError> {
        let map_err = |source| TransferError::ChunkRead {
            index: chunk.index,
            source,
        };
        let mut file = File::open(path).await.map_err(map_err)?;
        file.seek(SeekFrom::Start(chunk.offset)).await.map_err(map_err)?;
        Ok(Self {
            file,
            index: chunk.index,
            remaining: chunk.len,
        })
    }

    /// Next buffer of chunk data, or `None` once the chunk is done.
    pub async fn next_buf(&mut self) -> Result<Option<Vec<u8>>, TransferError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let want = (READ_BUF_SIZE as u64).min(self.remaining) as usize;
        let mut buf = vec![0u8; want];
        let n = self
            .file
            .read(&mut buf)
            .await
            .map_err(|source| TransferError::ChunkRead {
                index: self.index,
                source,
            })?;
        if n == 0 {
            // EOF before the chunk filled up; end the sequence.
            self.remaining = 0;
            return Ok(None);
        }
        buf.truncate(n);
        self.remaining -= n as u64;
        Ok(Some(buf))
    }
}
