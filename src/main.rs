//! Portcast CLI - parallel single-file sender
//!
//! Binds the control channel, waits for a receiver, then fans the file
//! out across the chunk-port pool. Exits non-zero if any chunk was lost.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use portcast::cli::SendOpts;
use portcast::progress::{NoopSink, ProgressSink};
use portcast::session::{AdmissionPolicy, Session, SessionConfig};

/// Drives an indicatif bar from aggregator reports.
struct BarSink {
    bar: ProgressBar,
    last_percent: Mutex<f64>,
}

impl BarSink {
    fn new(file_size: u64) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{bar:40.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(format!("0.0% of {} bytes", file_size));
        Self {
            bar,
            last_percent: Mutex::new(0.0),
        }
    }

    fn finish(&self) {
        self.bar.finish_with_message(format!("{:.1}%", *self.last_percent.lock()));
    }
}

impl ProgressSink for BarSink {
    fn accept(&self, percent: f64) {
        *self.last_percent.lock() = percent;
        self.bar.set_position(percent as u64);
        self.bar.set_message(format!("{:.1}%", percent));
    }
}

fn main() -> Result<()> {
    let opts = SendOpts::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if opts.ports == 0 {
        anyhow::bail!("--ports must be at least 1");
    }
    if u32::from(opts.base_port) + u32::from(opts.ports) > u32::from(u16::MAX) {
        anyhow::bail!(
            "port pool [{}..{}) exceeds the valid port range",
            opts.base_port,
            u32::from(opts.base_port) + u32::from(opts.ports)
        );
    }

    let config = SessionConfig {
        bind_ip: opts.bind,
        control_port: opts.control_port,
        base_port: opts.base_port,
        pool_size: opts.ports,
        policy: if opts.window {
            AdmissionPolicy::Window
        } else {
            AdmissionPolicy::Batch
        },
        ..SessionConfig::default()
    };

    let session = Session::new(config, &opts.file)?;
    let file_size = session.file_size();

    let bar = if opts.quiet {
        None
    } else {
        Some(Arc::new(BarSink::new(file_size)))
    };
    let sink: Arc<dyn ProgressSink> = match &bar {
        Some(b) => b.clone(),
        None => Arc::new(NoopSink),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let report = rt.block_on(session.run(sink))?;

    if let Some(b) = &bar {
        b.finish();
    }

    if report.is_complete() {
        println!(
            "Sent {} bytes of {}",
            report.bytes_confirmed,
            opts.file.display()
        );
        Ok(())
    } else {
        eprintln!(
            "Incomplete transfer: {}/{} bytes confirmed, lost chunks {:?}",
            report.bytes_confirmed, report.file_size, report.failed_chunks
        );
        std::process::exit(1);
    }
}
