use std::time::Duration;

use relay_services::LoopExit;

use crate::*;

/// Every packet is journaled in order and forwarded unchanged at full rate;
/// the decimated group sees every fifth packet.
#[tokio::test]
async fn test_relay_journals_and_forwards() -> Result<()> {
    let harness = Harness::start("forward", 50 * 1024 * 1024, Some(5)).await?;

    let sent: Vec<Vec<u8>> = (0..12).map(|i| packet(i, 30)).collect();
    for p in &sent {
        harness.relay(p).await?;
    }

    // Packets 5 and 10 (1-based) go to the decimated group.
    assert_eq!(recv_one(&harness.decimated_rx).await?, sent[4]);
    assert_eq!(recv_one(&harness.decimated_rx).await?, sent[9]);
    assert!(stays_quiet(&harness.decimated_rx, Duration::from_millis(200)).await);

    let (report, dir) = harness.stop().await?;
    assert_eq!(report.exit, LoopExit::Shutdown);
    assert_eq!(report.stats.packets_received, 12);
    assert_eq!(report.stats.full_rate_sent, 12);
    assert_eq!(report.stats.decimated_sent, 2);
    assert_eq!(report.stats.decimated_skipped, 10);
    assert_eq!(report.stats.rotations, 0);

    let files = journal_files(&dir)?;
    assert_eq!(files.len(), 1);
    assert_eq!(read_journal(&files[0])?, sent);
    // 1 + 1 + 30 + 16 bytes per block.
    assert_eq!(std::fs::metadata(&files[0])?.len(), 12 * 48);

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}

/// With decimation disabled nothing reaches the decimated group, and the
/// full-rate path is unaffected.
#[tokio::test]
async fn test_relay_without_decimation() -> Result<()> {
    let harness = Harness::start("nodecim", 50 * 1024 * 1024, None).await?;

    for i in 0..6 {
        harness.relay(&packet(i, 64)).await?;
    }
    assert!(stays_quiet(&harness.decimated_rx, Duration::from_millis(200)).await);

    let (report, dir) = harness.stop().await?;
    assert_eq!(report.stats.full_rate_sent, 6);
    assert_eq!(report.stats.decimated_sent, 0);
    assert_eq!(report.stats.decimated_skipped, 0);

    let files = journal_files(&dir)?;
    assert_eq!(read_journal(&files[0])?.len(), 6);

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}

/// Factor 1 forwards every packet to both groups.
#[tokio::test]
async fn test_relay_factor_one_mirrors_full_rate() -> Result<()> {
    let harness = Harness::start("factor1", 50 * 1024 * 1024, Some(1)).await?;

    for i in 0..4 {
        let p = packet(i, 20);
        harness.relay(&p).await?;
        assert_eq!(recv_one(&harness.decimated_rx).await?, p);
    }

    let (report, dir) = harness.stop().await?;
    assert_eq!(report.stats.decimated_sent, 4);

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}

/// Empty and maximum-size datagrams are journaled as blocks like any other.
#[tokio::test]
async fn test_relay_edge_sizes() -> Result<()> {
    let harness = Harness::start("sizes", 50 * 1024 * 1024, None).await?;

    let big = vec![0x5Au8; 60_000];
    harness.sender.send_to(&[], harness.rx_addr).await?;
    assert!(recv_one(&harness.full_rate_rx).await?.is_empty());
    harness.relay(&big).await?;

    let (report, dir) = harness.stop().await?;
    assert_eq!(report.stats.packets_received, 2);
    assert_eq!(report.stats.bytes_received, 60_000);

    let files = journal_files(&dir)?;
    assert_eq!(read_journal(&files[0])?, vec![Vec::new(), big]);

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}

/// Shutdown on an idle loop returns promptly and leaves a valid, empty journal.
#[tokio::test]
async fn test_shutdown_while_idle() -> Result<()> {
    let harness = Harness::start("idle", 1024, Some(5)).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (report, dir) = harness.stop().await?;
    assert_eq!(report.exit, LoopExit::Shutdown);
    assert_eq!(report.stats.packets_received, 0);

    let files = journal_files(&dir)?;
    assert_eq!(files.len(), 1);
    assert!(read_journal(&files[0])?.is_empty());

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}
