//! Progress aggregation and the external progress sink.
//!
//! The aggregator owns the running byte total and is fed harvested chunk
//! outcomes on the dispatcher task, so no locking is needed around the
//! total itself. Only confirmed full chunks advance progress; a failed
//! chunk contributes nothing and emits no report. Completions arrive in
//! whatever order chunks finish, so the reported percentage is monotonic
//! in time but not in file position.

use std::sync::Arc;

use crate::worker::ChunkOutcome;

/// External consumer of percentage-complete updates.
pub trait ProgressSink: Send + Sync {
    fn accept(&self, percent: f64);
}

/// Sink that discards every report; zero overhead when nobody is watching.
pub struct NoopSink;
impl ProgressSink for NoopSink {
    fn accept(&self, _percent: f64) {}
}

/// Running byte total for one session.
pub struct Aggregator {
    file_size: u64,
    confirmed: u64,
    sink: Arc<dyn ProgressSink>,
}

impl Aggregator {
    pub fn new(file_size: u64, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            file_size,
            confirmed: 0,
            sink,
        }
    }

    /// Fold one harvested outcome into the total. Reports
    /// `confirmed / file_size * 100` to the sink on success; zero-byte
    /// outcomes (failed chunks) are absorbed silently.
    pub fn on_outcome(&mut self, outcome: &ChunkOutcome) {
        if outcome.bytes_sent == 0 {
            return;
        }
        self.confirmed += outcome.bytes_sent;
        self.sink
            .accept(self.confirmed as f64 / self.file_size as f64 * 100.0);
    }

    /// Total bytes confirmed so far. Never decreases.
    pub fn confirmed(&self) -> u64 {
        self.confirmed
    }
}
