//! Whole-session driver: control handshake, chunk dispatch, harvest.
//!
//! The session owns the port pool and the progress aggregator on a single
//! task; workers run as spawned tokio tasks inside a `JoinSet` and only
//! communicate by returning their outcome. Dispatch follows increasing
//! chunk index; completion order is whatever the network gives us.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::chunk::{self, Chunk};
use crate::port_pool::PortPool;
use crate::progress::{Aggregator, ProgressSink};
use crate::protocol::{self, BASE_PORT, CHUNK_BYTES, CONTROL_PORT, POOL_SIZE};
use crate::worker::{self, ChunkOutcome};

/// How the dispatcher behaves when every pool port is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Drain the entire in-flight wave before dispatching anything new.
    #[default]
    Batch,
    /// Dispatch the next chunk as soon as any one port frees up.
    Window,
}

/// Session parameters. Defaults reproduce the wire constants; tests and
/// the CLI override ports and widths as needed.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Address the control listener and every chunk listener bind to.
    pub bind_ip: IpAddr,
    pub control_port: u16,
    pub base_port: u16,
    pub pool_size: u16,
    pub chunk_bytes: u64,
    pub policy: AdmissionPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            control_port: CONTROL_PORT,
            base_port: BASE_PORT,
            pool_size: POOL_SIZE,
            chunk_bytes: CHUNK_BYTES,
            policy: AdmissionPolicy::default(),
        }
    }
}

/// What a finished session looked like. `bytes_confirmed < file_size`
/// means some chunks were lost; `failed_chunks` names them. There is no
/// retry path, so the caller decides what a partial session is worth.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub file_size: u64,
    pub bytes_confirmed: u64,
    pub failed_chunks: Vec<u64>,
}

impl SessionReport {
    pub fn is_complete(&self) -> bool {
        self.bytes_confirmed == self.file_size
    }
}

/// One sender invocation for one file. Created per transfer, consumed by
/// [`run`](Self::run).
pub struct Session {
    config: SessionConfig,
    file_path: PathBuf,
    file_name: String,
    file_size: u64,
}

impl Session {
    /// Stat the file up front; an unreadable file aborts the session
    /// before any connection work begins.
    pub fn new(config: SessionConfig, file_path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(file_path)
            .with_context(|| format!("cannot stat source file {}", file_path.display()))?;
        anyhow::ensure!(meta.is_file(), "{} is not a regular file", file_path.display());
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("source path has no file name")?;
        Ok(Self {
            config,
            file_path: file_path.to_path_buf(),
            file_name,
            file_size: meta.len(),
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Drive the whole transfer: handshake, dispatch every chunk, harvest
    /// every outcome. Returns once all workers are drained.
    pub async fn run(self, sink: Arc<dyn ProgressSink>) -> Result<SessionReport> {
        self.send_header().await?;

        let chunks = chunk::partition(self.file_size, self.config.chunk_bytes);
        info!(
            file = %self.file_name,
            size = self.file_size,
            chunks = chunks.len(),
            ports = self.config.pool_size,
            "starting chunk dispatch"
        );

        let mut pool = PortPool::new(self.config.base_port, self.config.pool_size);
        let mut aggregator = Aggregator::new(self.file_size, sink);
        let mut failed_chunks = Vec::new();
        let mut in_flight: JoinSet<ChunkOutcome> = JoinSet::new();

        for chunk in chunks {
            if pool.is_exhausted() {
                match self.config.policy {
                    AdmissionPolicy::Batch => {
                        // The whole wave drains before the next chunk
                        // goes out.
                        while let Some(joined) = in_flight.join_next().await {
                            let outcome = joined.context("chunk worker panicked")?;
                            harvest(&mut pool, &mut aggregator, &mut failed_chunks, outcome)?;
                        }
                    }
                    AdmissionPolicy::Window => {
                        let joined = in_flight
                            .join_next()
                            .await
                            .expect("pool exhausted implies workers in flight");
                        let outcome = joined.context("chunk worker panicked")?;
                        harvest(&mut pool, &mut aggregator, &mut failed_chunks, outcome)?;
                    }
                }
            }
            let port = pool.acquire()?;
            debug!(chunk = chunk.index, port, "dispatching chunk");
            in_flight.spawn(self.spawn_worker(port, chunk));
        }

        // Everything is dispatched; drain the tail.
        while let Some(joined) = in_flight.join_next().await {
            let outcome = joined.context("chunk worker panicked")?;
            harvest(&mut pool, &mut aggregator, &mut failed_chunks, outcome)?;
        }

        failed_chunks.sort_unstable();
        let report = SessionReport {
            file_size: self.file_size,
            bytes_confirmed: aggregator.confirmed(),
            failed_chunks,
        };
        if report.is_complete() {
            info!(bytes = report.bytes_confirmed, "session complete");
        } else {
            warn!(
                bytes = report.bytes_confirmed,
                expected = report.file_size,
                failed = report.failed_chunks.len(),
                "session finished with lost chunks"
            );
        }
        Ok(report)
    }

    fn spawn_worker(
        &self,
        port: u16,
        chunk: Chunk,
    ) -> impl std::future::Future<Output = ChunkOutcome> + Send + 'static {
        worker::run(self.config.bind_ip, port, self.file_path.clone(), chunk)
    }

    /// Control handshake: accept one connection on the registered port,
    /// push the 200-byte header, close. Runs once, before any chunk work,
    /// so the receiver knows the file size and name.
    async fn send_header(&self) -> Result<()> {
        let header = protocol::encode_header(self.file_size, &self.file_name)?;
        let listener = TcpListener::bind((self.config.bind_ip, self.config.control_port))
            .await
            .with_context(|| format!("bind control port {}", self.config.control_port))?;
        info!(
            port = self.config.control_port,
            file = %self.file_name,
            size = self.file_size,
            "waiting for receiver on control channel"
        );
        let (mut stream, peer) = listener
            .accept()
            .await
            .context("accept on control channel")?;
        info!(%peer, "control connection established");
        stream
            .write_all(&header)
            .await
            .context("write control header")?;
        stream.shutdown().await.context("close control channel")?;
        Ok(())
    }
}

fn harvest(
    pool: &mut PortPool,
    aggregator: &mut Aggregator,
    failed_chunks: &mut Vec<u64>,
    outcome: ChunkOutcome,
) -> Result<()> {
    pool.release(outcome.port)?;
    if outcome.bytes_sent == 0 {
        failed_chunks.push(outcome.index);
    }
    aggregator.on_outcome(&outcome);
    Ok(())
}
