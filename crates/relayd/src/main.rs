//! relayd — telemetry relay daemon.
//!
//! Usage: relayd <channel_name>
//!
//! Receives datagrams on the configured local port, journals every packet,
//! and forwards to the full-rate and decimated multicast groups.

use anyhow::{Context, Result};

use relay_core::config::RelayConfig;
use relay_services::transport::{UdpSink, UdpSource};
use relay_services::{BlockWriter, LoopSettings, RelayLoop, WriterOptions};

mod sockets;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let channel = match std::env::args().nth(1) {
        Some(c) => c,
        None => {
            eprintln!("Usage: relayd <channel_name>");
            eprintln!("Example: relayd example");
            std::process::exit(1);
        }
    };

    // Load config
    let config = RelayConfig::load(&channel).context("failed to load configuration")?;
    tracing::info!(
        channel = %config.channel,
        rx = %config.receive_addr(),
        output_dir = %config.storage.output_dir.display(),
        rotation_threshold = config.storage.rotation_threshold,
        decimation = config.decimation.enabled,
        decimation_factor = config.decimation.factor,
        "configuration loaded"
    );

    // Sockets
    let rx_socket = sockets::bind_receiver(config.receive_addr(), config.receive.recv_buffer_bytes)
        .context("failed to bind receive socket")?;

    let full_rate_dest = config.forward.full_rate.socket_addr();
    let full_rate = UdpSink::new(
        sockets::multicast_sender(full_rate_dest, config.forward.multicast_ttl)
            .context("failed to create full-rate sender")?,
        full_rate_dest,
    );

    let decimated = if config.decimation.enabled {
        let dest = config.forward.decimated.socket_addr();
        Some(UdpSink::new(
            sockets::multicast_sender(dest, config.forward.multicast_ttl)
                .context("failed to create decimated sender")?,
            dest,
        ))
    } else {
        None
    };

    // Journal
    let writer = BlockWriter::open(WriterOptions::from_config(&config.storage))
        .context("failed to open journal")?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);

    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // ── Run ──────────────────────────────────────────────────────────────────
    let relay = RelayLoop::new(
        LoopSettings::from_config(&config),
        writer,
        UdpSource::new(rx_socket),
        full_rate,
        decimated,
        shutdown_rx,
    );

    let report = relay.run().await.context("relay loop failed")?;
    tracing::info!(
        exit = ?report.exit,
        packets = report.stats.packets_received,
        forward_failures = report.stats.forward_failures(),
        rotations = report.stats.rotations,
        "relayd stopped"
    );

    Ok(())
}

/// Resolve on ctrl-c, or SIGTERM on unix.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
