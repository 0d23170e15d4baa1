//! Loopback end-to-end sessions: a real Session on one side, a minimal
//! in-test receiver on the other.

use anyhow::Result;
use parking_lot::Mutex;
use portcast::progress::ProgressSink;
use portcast::protocol::{decode_header, CHUNK_ID_LEN, HEADER_LEN};
use portcast::session::{AdmissionPolicy, Session, SessionConfig, SessionReport};
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn write_file(path: &std::path::Path, size: usize) -> Result<Vec<u8>> {
    let mut data = vec![0u8; size];
    let mut val: u8 = 0;
    for b in data.iter_mut() {
        *b = val;
        val = val.wrapping_add(13);
    }
    let mut f = std::fs::File::create(path)?;
    f.write_all(&data)?;
    Ok(data)
}

/// Claim a contiguous block of `count` free ports: the first is the control
/// port, the rest form the chunk pool. Each call searches a fresh window so
/// tests running in parallel never probe the same region.
fn alloc_ports(count: u16) -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static NEXT_WINDOW: AtomicU16 = AtomicU16::new(42000);
    loop {
        let base = NEXT_WINDOW.fetch_add(64, Ordering::Relaxed);
        assert!(base < 60000, "ran out of port windows");
        let probes: Vec<_> = (base..base + count)
            .map(|p| std::net::TcpListener::bind(("127.0.0.1", p)))
            .collect();
        if probes.iter().all(|r| r.is_ok()) {
            return base;
        }
    }
}

/// Collects every percentage the aggregator reports.
struct CollectingSink(Mutex<Vec<f64>>);
impl ProgressSink for CollectingSink {
    fn accept(&self, percent: f64) {
        self.0.lock().push(percent);
    }
}

async fn connect_retry(port: u16) -> TcpStream {
    loop {
        match TcpStream::connect((LOCALHOST, port)).await {
            Ok(s) => return s,
            Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
        }
    }
}

/// Read the 200-byte control header.
async fn read_header(control_port: u16) -> (u64, String) {
    let mut stream = connect_retry(control_port).await;
    let mut raw = [0u8; HEADER_LEN];
    stream.read_exact(&mut raw).await.unwrap();
    decode_header(&raw).expect("malformed control header")
}

/// Serve chunk connections one at a time by scanning the port range until
/// `expected` chunks arrived. Chunks whose id is in `drop_ids` are
/// abandoned right after the id field, without reading the body.
async fn receive_chunks(
    base_port: u16,
    pool_size: u16,
    expected: usize,
    drop_ids: &[u64],
) -> Vec<(u64, Vec<u8>)> {
    let mut received = Vec::new();
    let mut dropped = 0usize;
    while received.len() + dropped < expected {
        let mut connected = None;
        for port in base_port..base_port + pool_size {
            if let Ok(s) = TcpStream::connect((LOCALHOST, port)).await {
                connected = Some(s);
                break;
            }
        }
        let Some(mut stream) = connected else {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            continue;
        };
        let mut id_raw = [0u8; CHUNK_ID_LEN];
        stream.read_exact(&mut id_raw).await.unwrap();
        let id: u64 = std::str::from_utf8(&id_raw)
            .unwrap()
            .trim_end_matches(' ')
            .parse()
            .unwrap();
        if drop_ids.contains(&id) {
            drop(stream);
            dropped += 1;
            continue;
        }
        let mut body = Vec::new();
        stream.read_to_end(&mut body).await.unwrap();
        received.push((id, body));
    }
    received
}

fn reassemble(chunks: &[(u64, Vec<u8>)], width: u64, file_size: usize) -> Vec<u8> {
    let mut out = vec![0u8; file_size];
    for (id, body) in chunks {
        let start = (id * width) as usize;
        out[start..start + body.len()].copy_from_slice(body);
    }
    out
}

async fn run_session(
    config: SessionConfig,
    path: &std::path::Path,
) -> (SessionReport, Vec<f64>) {
    let sink = Arc::new(CollectingSink(Mutex::new(Vec::new())));
    let session = Session::new(config, path).unwrap();
    let report = session.run(sink.clone()).await.unwrap();
    let percents = sink.0.lock().clone();
    (report, percents)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_chunk_session() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("small.bin");
    let data = write_file(&path, 100_000)?;

    let control_port = alloc_ports(2);
    let base_port = control_port + 1;
    let config = SessionConfig {
        bind_ip: LOCALHOST,
        control_port,
        base_port,
        pool_size: 1,
        ..SessionConfig::default()
    };

    let receiver = tokio::spawn(async move {
        let header = read_header(control_port).await;
        let chunks = receive_chunks(base_port, 1, 1, &[]).await;
        (header, chunks)
    });

    let (report, percents) = run_session(config, &path).await;
    let ((size, name), chunks) = receiver.await?;

    assert_eq!(size, 100_000);
    assert_eq!(name, "small.bin");
    assert!(report.is_complete());
    assert!(report.failed_chunks.is_empty());
    assert_eq!(report.bytes_confirmed, 100_000);
    assert_eq!(percents, vec![100.0]);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].0, 0);
    assert_eq!(chunks[0].1, data);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multi_wave_batch_session() -> Result<()> {
    // 3 full chunks + 1000 trailing bytes, pool of 2: two full waves,
    // then the remainder. Four outcomes, every byte confirmed.
    let width: u64 = 256 * 1024;
    let file_size = (3 * width + 1000) as usize;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("waves.bin");
    let data = write_file(&path, file_size)?;

    let control_port = alloc_ports(3);
    let base_port = control_port + 1;
    let config = SessionConfig {
        bind_ip: LOCALHOST,
        control_port,
        base_port,
        pool_size: 2,
        chunk_bytes: width,
        policy: AdmissionPolicy::Batch,
        ..SessionConfig::default()
    };

    let receiver = tokio::spawn(async move {
        let header = read_header(control_port).await;
        let chunks = receive_chunks(base_port, 2, 4, &[]).await;
        (header, chunks)
    });

    let (report, percents) = run_session(config, &path).await;
    let ((size, _), chunks) = receiver.await?;

    assert_eq!(size, file_size as u64);
    assert!(report.is_complete());
    assert_eq!(report.bytes_confirmed, file_size as u64);
    assert_eq!(chunks.len(), 4);

    // Progress is monotonic in time and lands exactly on 100.
    assert_eq!(percents.len(), 4);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*percents.last().unwrap(), 100.0);

    assert_eq!(reassemble(&chunks, width, file_size), data);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sliding_window_session() -> Result<()> {
    let width: u64 = 128 * 1024;
    let file_size = (4 * width + 500) as usize;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("window.bin");
    let data = write_file(&path, file_size)?;

    let control_port = alloc_ports(3);
    let base_port = control_port + 1;
    let config = SessionConfig {
        bind_ip: LOCALHOST,
        control_port,
        base_port,
        pool_size: 2,
        chunk_bytes: width,
        policy: AdmissionPolicy::Window,
        ..SessionConfig::default()
    };

    let receiver = tokio::spawn(async move {
        read_header(control_port).await;
        receive_chunks(base_port, 2, 5, &[]).await
    });

    let (report, percents) = run_session(config, &path).await;
    let chunks = receiver.await?;

    assert!(report.is_complete());
    assert_eq!(chunks.len(), 5);
    assert_eq!(*percents.last().unwrap(), 100.0);
    assert_eq!(reassemble(&chunks, width, file_size), data);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lost_chunk_is_reported_and_port_reclaimed() -> Result<()> {
    // The receiver abandons chunk 0 right after its id; the 4 MB body
    // overwhelms the socket buffers, so the worker's writes fail and the
    // chunk yields a zero-byte outcome. The session still finishes and
    // names the lost chunk.
    let width: u64 = 4_000_000;
    let file_size = (width + 1000) as usize;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("lossy.bin");
    let data = write_file(&path, file_size)?;

    let control_port = alloc_ports(3);
    let base_port = control_port + 1;
    let config = SessionConfig {
        bind_ip: LOCALHOST,
        control_port,
        base_port,
        pool_size: 2,
        chunk_bytes: width,
        ..SessionConfig::default()
    };

    let receiver = tokio::spawn(async move {
        read_header(control_port).await;
        receive_chunks(base_port, 2, 2, &[0]).await
    });

    let (report, percents) = run_session(config, &path).await;
    let chunks = receiver.await?;

    assert!(!report.is_complete());
    assert_eq!(report.failed_chunks, vec![0]);
    assert_eq!(report.bytes_confirmed, 1000);

    // Only the surviving chunk reported progress.
    assert_eq!(percents.len(), 1);
    assert!(*percents.last().unwrap() < 100.0);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].0, 1);
    assert_eq!(chunks[0].1, &data[width as usize..]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_file_session() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("empty.bin");
    write_file(&path, 0)?;

    let control_port = alloc_ports(2);
    let base_port = control_port + 1;
    let config = SessionConfig {
        bind_ip: LOCALHOST,
        control_port,
        base_port,
        pool_size: 1,
        ..SessionConfig::default()
    };

    let receiver = tokio::spawn(async move { read_header(control_port).await });

    let (report, percents) = run_session(config, &path).await;
    let (size, name) = receiver.await?;

    // Zero chunks: the handshake still happens, nothing else does.
    assert_eq!(size, 0);
    assert_eq!(name, "empty.bin");
    assert!(report.is_complete());
    assert_eq!(report.bytes_confirmed, 0);
    assert!(percents.is_empty());
    Ok(())
}
