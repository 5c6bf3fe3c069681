//! Relay integration test harness.
//!
//! Tests here drive a full relay loop over real UDP sockets on loopback:
//! a sender feeds the receive socket, and plain UDP receivers stand in for
//! the full-rate and decimated multicast groups. Journals are written to
//! per-test directories under the system temp dir and read back with the
//! block reader.
//!
//!   cargo test --test integration

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use relay_core::wire::BlockReader;
use relay_services::transport::{UdpSink, UdpSource};
use relay_services::{
    BlockWriter, LoopReport, LoopSettings, RelayError, RelayLoop, WriterOptions,
};

mod relay;
mod rotation;

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long a test waits for a forwarded datagram before failing.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A fresh, empty directory for one test's journal.
pub fn temp_dir(label: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "relay-integration-{}-{}-{}",
        label,
        std::process::id(),
        n
    ));
    std::fs::remove_dir_all(&dir).ok();
    dir
}

/// Journal files in `dir`, in creation order.
pub fn journal_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "avro"))
        .collect();
    files.sort();
    Ok(files)
}

/// Every payload in one journal file.
pub fn read_journal(path: &Path) -> Result<Vec<Vec<u8>>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    BlockReader::new(BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("corrupt journal {}", path.display()))
}

/// Receive one datagram or fail after [`RECV_TIMEOUT`].
pub async fn recv_one(socket: &UdpSocket) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; 65535];
    let (len, _) = tokio::time::timeout(RECV_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .context("timed out waiting for forwarded packet")??;
    buf.truncate(len);
    Ok(buf)
}

/// True if nothing arrives on `socket` within `wait`.
pub async fn stays_quiet(socket: &UdpSocket, wait: Duration) -> bool {
    let mut buf = [0u8; 64];
    tokio::time::timeout(wait, socket.recv_from(&mut buf))
        .await
        .is_err()
}

/// Test payload `i`: a sequence number followed by filler, `len` bytes total.
pub fn packet(i: u32, len: usize) -> Vec<u8> {
    let mut p = i.to_be_bytes().to_vec();
    p.resize(len.max(4), (i % 251) as u8);
    p
}

async fn loopback() -> Result<UdpSocket> {
    UdpSocket::bind("127.0.0.1:0")
        .await
        .context("failed to bind loopback socket")
}

/// A relay loop running on loopback sockets, with handles for every side.
pub struct Harness {
    pub sender: UdpSocket,
    pub rx_addr: SocketAddr,
    pub full_rate_rx: UdpSocket,
    pub decimated_rx: UdpSocket,
    pub dir: PathBuf,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<LoopReport, RelayError>>,
}

impl Harness {
    /// Spawn a relay loop. `decimation_factor` of `None` disables the
    /// decimated output.
    pub async fn start(
        label: &str,
        rotation_threshold: u64,
        decimation_factor: Option<u32>,
    ) -> Result<Self> {
        let dir = temp_dir(label);

        let rx = loopback().await?;
        let rx_addr = rx.local_addr()?;
        let full_rate_rx = loopback().await?;
        let decimated_rx = loopback().await?;

        let full_rate = UdpSink::new(loopback().await?, full_rate_rx.local_addr()?);
        let decimated = match decimation_factor {
            Some(_) => Some(UdpSink::new(loopback().await?, decimated_rx.local_addr()?)),
            None => None,
        };

        let writer = BlockWriter::open(WriterOptions::new(&dir))?;
        let settings = LoopSettings {
            channel: label.to_string(),
            rotation_threshold,
            decimation_factor: decimation_factor.unwrap_or(1),
            stats_interval: None,
        };

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let relay = RelayLoop::new(
            settings,
            writer,
            UdpSource::new(rx),
            full_rate,
            decimated,
            shutdown_rx,
        );
        let task = tokio::spawn(relay.run());

        Ok(Self {
            sender: loopback().await?,
            rx_addr,
            full_rate_rx,
            decimated_rx,
            dir,
            shutdown,
            task,
        })
    }

    /// Send one packet and wait until its full-rate copy arrives, which
    /// means it is already journaled.
    pub async fn relay(&self, payload: &[u8]) -> Result<()> {
        self.sender.send_to(payload, self.rx_addr).await?;
        let forwarded = recv_one(&self.full_rate_rx).await?;
        anyhow::ensure!(forwarded == payload, "full-rate copy differs from input");
        Ok(())
    }

    /// Signal shutdown and wait for the loop to finish.
    pub async fn stop(self) -> Result<(LoopReport, PathBuf)> {
        self.shutdown.send(()).ok();
        let report = tokio::time::timeout(RECV_TIMEOUT, self.task)
            .await
            .context("relay loop did not stop")???;
        Ok((report, self.dir))
    }
}
