//! relay-core — journal wire format and configuration.
//! Shared by the relay daemon, its services, and the offline tooling.

pub mod config;
pub mod wire;

pub use config::{ConfigError, Endpoint, RelayConfig};
pub use wire::{BlockReader, WireError, MAX_PACKET_SIZE, SYNC_MARKER, SYNC_MARKER_SIZE};
