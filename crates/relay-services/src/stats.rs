//! Relay counters.
//!
//! Owned and updated by the relay loop only; copied out in the final report.

/// Running totals for one relay loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub packets_received: u64,
    pub bytes_received: u64,
    /// Journal bytes, including block framing.
    pub bytes_persisted: u64,
    pub full_rate_sent: u64,
    pub full_rate_failed: u64,
    pub decimated_sent: u64,
    pub decimated_failed: u64,
    /// Packets the decimator held back from the decimated output.
    pub decimated_skipped: u64,
    pub rotations: u64,
}

impl RelayStats {
    /// Forward attempts that failed on either output.
    pub fn forward_failures(&self) -> u64 {
        self.full_rate_failed + self.decimated_failed
    }

    pub fn log(&self, channel: &str) {
        tracing::info!(
            channel,
            packets = self.packets_received,
            bytes_received = self.bytes_received,
            bytes_persisted = self.bytes_persisted,
            full_rate_sent = self.full_rate_sent,
            full_rate_failed = self.full_rate_failed,
            decimated_sent = self.decimated_sent,
            decimated_failed = self.decimated_failed,
            decimated_skipped = self.decimated_skipped,
            rotations = self.rotations,
            "relay stats"
        );
    }
}
