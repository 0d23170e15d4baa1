//! Shared CLI fragments for the portcast binary

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::protocol::{BASE_PORT, CONTROL_PORT, POOL_SIZE};

/// Sender options
#[derive(Clone, Debug, Parser)]
#[command(
    author,
    version,
    about = "portcast - send one file over a pool of parallel TCP chunk connections"
)]
pub struct SendOpts {
    /// File to send
    pub file: PathBuf,

    /// Address to bind the control and chunk listeners on
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Control-channel port the receiver dials first
    #[arg(long, default_value_t = CONTROL_PORT)]
    pub control_port: u16,

    /// First chunk port; the pool spans [base-port, base-port + ports)
    #[arg(long, default_value_t = BASE_PORT)]
    pub base_port: u16,

    /// Number of chunk ports (caps transfer concurrency)
    #[arg(long, default_value_t = POOL_SIZE)]
    pub ports: u16,

    /// Dispatch a new chunk as soon as any port frees up, instead of
    /// draining a full wave first
    #[arg(long)]
    pub window: bool,

    /// Suppress the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}
