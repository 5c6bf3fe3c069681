use std::time::Duration;

use crate::*;

/// Threshold 100, factor 3, five 30-byte packets: the first journal closes
/// at 144 bytes after packet 3, the second holds packets 4 and 5, and only
/// packet 3 reaches the decimated group.
#[tokio::test]
async fn test_rotation_splits_journal() -> Result<()> {
    let harness = Harness::start("rotate", 100, Some(3)).await?;

    let sent: Vec<Vec<u8>> = (1..=5).map(|i| packet(i, 30)).collect();
    for p in &sent {
        harness.relay(p).await?;
    }
    assert_eq!(recv_one(&harness.decimated_rx).await?, sent[2]);
    assert!(stays_quiet(&harness.decimated_rx, Duration::from_millis(200)).await);

    let (report, dir) = harness.stop().await?;
    assert_eq!(report.stats.rotations, 1);
    assert_eq!(report.stats.bytes_persisted, 5 * 48);

    let files = journal_files(&dir)?;
    assert_eq!(files.len(), 2);
    assert_eq!(std::fs::metadata(&files[0])?.len(), 144);
    assert_eq!(std::fs::metadata(&files[1])?.len(), 96);
    assert_eq!(read_journal(&files[0])?, sent[..3]);
    assert_eq!(read_journal(&files[1])?, sent[3..]);

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}

/// A threshold below one block rotates after every packet; each journal is
/// independently readable and no packet is lost across the boundaries.
#[tokio::test]
async fn test_rotation_every_packet() -> Result<()> {
    let harness = Harness::start("rotate-each", 1, None).await?;

    let sent: Vec<Vec<u8>> = (0..8).map(|i| packet(i, 12)).collect();
    for p in &sent {
        harness.relay(p).await?;
    }

    let (report, dir) = harness.stop().await?;
    assert_eq!(report.stats.rotations, 8);

    let files = journal_files(&dir)?;
    // One file per packet plus the empty file opened by the last rotation.
    assert_eq!(files.len(), 9);

    let mut replayed = Vec::new();
    for file in &files {
        let blocks = read_journal(file)?;
        assert!(blocks.len() <= 1, "{} holds {} blocks", file.display(), blocks.len());
        replayed.extend(blocks);
    }
    assert_eq!(replayed, sent);
    assert_eq!(std::fs::metadata(&files[8])?.len(), 0);

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}
