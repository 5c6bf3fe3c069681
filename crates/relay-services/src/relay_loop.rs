//! The relay loop — receive, persist, forward, rotate.
//!
//! Every received packet goes through the same four steps, in order, before
//! the next receive:
//!
//!   1. append a block to the journal (failure ends the loop)
//!   2. send to the full-rate output (failure is logged and counted)
//!   3. if decimation is enabled, advance the decimator exactly once and
//!      send to the decimated output when it fires (failure is logged)
//!   4. rotate the journal once it reaches the rotation threshold
//!      (failure ends the loop)
//!
//! No packet is forwarded before it is on disk, and forward failures never
//! touch the journal or the decimation phase. Shutdown is observed only while
//! waiting for the next packet; an iteration in progress always completes.

use std::io;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use relay_core::config::RelayConfig;
use relay_core::wire::MAX_PACKET_SIZE;

use crate::block_writer::{BlockWriter, WriterError};
use crate::decimator::Decimator;
use crate::stats::RelayStats;
use crate::transport::{PacketSink, PacketSource};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("failed to persist packet: {0}")]
    Persist(WriterError),
    #[error("failed to rotate journal: {0}")]
    Rotate(WriterError),
    #[error("receive failed: {0}")]
    Receive(io::Error),
}

/// Why a loop stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The shutdown channel fired or was dropped.
    Shutdown,
    /// The packet source closed.
    SourceClosed,
}

#[derive(Debug, Clone)]
pub struct LoopReport {
    pub exit: LoopExit,
    pub stats: RelayStats,
}

/// Loop parameters taken from the resolved configuration.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub channel: String,
    pub rotation_threshold: u64,
    pub decimation_factor: u32,
    /// Period of the stats log line. `None` logs only at exit.
    pub stats_interval: Option<Duration>,
}

impl LoopSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            channel: config.channel.clone(),
            rotation_threshold: config.storage.rotation_threshold,
            decimation_factor: config.decimation.factor,
            stats_interval: match config.stats.interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// Owns the journal writer and the decimator for one channel.
///
/// Decimation is enabled exactly when a decimated sink is supplied.
pub struct RelayLoop<S, K> {
    settings: LoopSettings,
    writer: BlockWriter,
    decimator: Decimator,
    source: S,
    full_rate: K,
    decimated: Option<K>,
    shutdown: broadcast::Receiver<()>,
    stats: RelayStats,
    buf: Vec<u8>,
}

impl<S: PacketSource, K: PacketSink> RelayLoop<S, K> {
    pub fn new(
        settings: LoopSettings,
        writer: BlockWriter,
        source: S,
        full_rate: K,
        decimated: Option<K>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let decimator = Decimator::new(settings.decimation_factor);
        Self {
            settings,
            writer,
            decimator,
            source,
            full_rate,
            decimated,
            shutdown,
            stats: RelayStats::default(),
            buf: vec![0u8; MAX_PACKET_SIZE],
        }
    }

    /// Run until shutdown, source close, or a fatal error.
    ///
    /// The journal is synced and closed on every exit path.
    pub async fn run(mut self) -> Result<LoopReport, RelayError> {
        tracing::info!(
            channel = %self.settings.channel,
            journal = %self.writer.path().display(),
            full_rate = ?self.full_rate.destination(),
            decimated = ?self.decimated.as_ref().and_then(|d| d.destination()),
            decimation_factor = self.decimator.factor(),
            rotation_threshold = self.settings.rotation_threshold,
            "relay loop starting"
        );

        let mut stats_interval = self.settings.stats_interval.map(|period| {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let outcome = loop {
            let received = tokio::select! {
                biased;

                _ = self.shutdown.recv() => {
                    tracing::info!(channel = %self.settings.channel, "relay loop shutting down");
                    break Ok(LoopExit::Shutdown);
                }

                _ = next_tick(&mut stats_interval) => {
                    self.stats.log(&self.settings.channel);
                    continue;
                }

                r = self.source.recv(&mut self.buf) => r,
            };

            let len = match received {
                Ok(Some((len, from))) => {
                    tracing::trace!(%from, bytes = len, "packet received");
                    len
                }
                Ok(None) => {
                    tracing::info!(channel = %self.settings.channel, "packet source closed");
                    break Ok(LoopExit::SourceClosed);
                }
                Err(e) => break Err(RelayError::Receive(e)),
            };

            if let Err(e) = self.relay_packet(len).await {
                break Err(e);
            }
        };

        self.writer.close();
        self.stats.log(&self.settings.channel);

        match outcome {
            Ok(exit) => Ok(LoopReport {
                exit,
                stats: self.stats,
            }),
            Err(e) => {
                tracing::error!(
                    channel = %self.settings.channel,
                    journal = %self.writer.path().display(),
                    error = %e,
                    "relay loop stopped"
                );
                Err(e)
            }
        }
    }

    /// One iteration for the packet in `buf[..len]`.
    async fn relay_packet(&mut self, len: usize) -> Result<(), RelayError> {
        let packet = &self.buf[..len];
        self.stats.packets_received += 1;
        self.stats.bytes_received += len as u64;

        let block_len = self
            .writer
            .append_block(packet)
            .map_err(RelayError::Persist)?;
        self.stats.bytes_persisted += block_len;

        match self.full_rate.send(packet).await {
            Ok(_) => self.stats.full_rate_sent += 1,
            Err(e) => {
                self.stats.full_rate_failed += 1;
                tracing::warn!(
                    dest = ?self.full_rate.destination(),
                    error = %e,
                    "full-rate forward failed"
                );
            }
        }

        if let Some(sink) = &self.decimated {
            if self.decimator.should_send() {
                match sink.send(packet).await {
                    Ok(_) => self.stats.decimated_sent += 1,
                    Err(e) => {
                        self.stats.decimated_failed += 1;
                        tracing::warn!(
                            dest = ?sink.destination(),
                            error = %e,
                            "decimated forward failed"
                        );
                    }
                }
            } else {
                self.stats.decimated_skipped += 1;
            }
        }

        if self.writer.bytes_written() >= self.settings.rotation_threshold {
            self.writer.rotate().map_err(RelayError::Rotate)?;
            self.stats.rotations += 1;
        }

        Ok(())
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
