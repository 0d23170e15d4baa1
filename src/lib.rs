//! Portcast library
//!
//! Sender-side engine that splits a single file into large byte-range
//! chunks and streams each chunk over its own TCP connection, drawing
//! listening ports from a bounded reusable pool.

pub mod chunk;
pub mod cli;
pub mod error;
pub mod port_pool;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod worker;
