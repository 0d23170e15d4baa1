//! Error types for the portcast sender.
//!
//! Per-chunk failures are isolated: a worker reports them as a zero-byte
//! outcome and the session keeps going. Only file-level and control-channel
//! failures abort a session, and those are raised before any chunk work
//! begins.

use std::io;
use thiserror::Error;

/// Errors that can occur while encoding wire fields, reading chunk data,
/// or running a chunk connection.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A fixed-width wire field cannot hold its content. Raised instead of
    /// truncating, which would corrupt what the receiver decodes.
    #[error("{field} exceeds its {width}-byte field (needs {need} bytes)")]
    FieldOverflow {
        field: &'static str,
        width: usize,
        need: usize,
    },

    /// Local file I/O failed while producing a chunk's bytes.
    #[error("read failure in chunk {index}: {source}")]
    ChunkRead {
        index: u64,
        #[source]
        source: io::Error,
    },

    /// Listener bind, accept, or socket write failed for a chunk.
    #[error("connection failure in chunk {index}: {source}")]
    ChunkConnection {
        index: u64,
        #[source]
        source: io::Error,
    },

    /// `acquire` was called on an empty pool. Callers are expected to check
    /// availability first; hitting this is a dispatcher bug.
    #[error("port pool exhausted: acquire called with no port available")]
    PoolExhausted,

    /// A port was released twice, or a port outside the pool's range was
    /// released. Either would break the no-two-workers-per-port invariant.
    #[error("port pool misuse: bad release of port {port}")]
    PoolMisuse { port: u16 },
}
