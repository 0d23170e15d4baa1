//! One-chunk transfer worker.
//!
//! Given a chunk and a pool port, a worker walks a fixed lifecycle:
//! bind a listener on the port, accept exactly one connection, write the
//! 10-byte chunk id, stream the chunk's buffers, shut the socket down.
//! There is no retry and no partial credit: any failure after dispatch
//! yields a zero-byte outcome, and the port always travels back to the
//! dispatcher inside the outcome so the pool never leaks.

use std::net::IpAddr;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::chunk::{Chunk, ChunkReader};
use crate::error::TransferError;
use crate::protocol::encode_chunk_id;

/// Result of one chunk transfer attempt, consumed exactly once by the
/// dispatcher. `bytes_sent == 0` marks a failed chunk.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOutcome {
    pub index: u64,
    pub bytes_sent: u64,
    pub port: u16,
}

/// Run one chunk transfer to completion. Never fails outward: errors are
/// logged and folded into a zero-byte outcome so the dispatcher always
/// harvests exactly one outcome per dispatched chunk.
pub async fn run(ip: IpAddr, port: u16, path: PathBuf, chunk: Chunk) -> ChunkOutcome {
    let bytes_sent = match stream_chunk(ip, port, &path, &chunk).await {
        Ok(sent) => sent,
        Err(e) => {
            warn!(chunk = chunk.index, port, error = %e, "chunk transfer failed");
            0
        }
    };
    ChunkOutcome {
        index: chunk.index,
        bytes_sent,
        port,
    }
}

async fn stream_chunk(
    ip: IpAddr,
    port: u16,
    path: &PathBuf,
    chunk: &Chunk,
) -> Result<u64, TransferError> {
    let conn_err = |source| TransferError::ChunkConnection {
        index: chunk.index,
        source,
    };

    // LISTENING: one listener per chunk, scoped to this function.
    let listener = TcpListener::bind((ip, port)).await.map_err(conn_err)?;

    // ACCEPTED: exactly one peer per chunk connection. The listener goes
    // away immediately so later dials get refused instead of queued.
    let (mut stream, peer) = listener.accept().await.map_err(conn_err)?;
    drop(listener);
    let _ = stream.set_nodelay(true);
    debug!(chunk = chunk.index, port, %peer, "chunk connection accepted");

    // STREAMING: id field first, then raw buffers until the chunk is done.
    let id = encode_chunk_id(chunk.index)?;
    stream.write_all(&id).await.map_err(conn_err)?;

    let mut reader = ChunkReader::open(path, chunk).await?;
    let mut sent = 0u64;
    while let Some(buf) = reader.next_buf().await? {
        stream.write_all(&buf).await.map_err(conn_err)?;
        sent += buf.len() as u64;
    }

    // CLOSED: the receiver detects the chunk boundary from EOF.
    stream.shutdown().await.map_err(conn_err)?;
    debug!(chunk = chunk.index, port, bytes = sent, "chunk streamed");
    Ok(sent)
}
