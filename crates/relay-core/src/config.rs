//! Configuration for the relay.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $RELAY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/relay/config.toml
//!   3. ~/.config/relay/config.toml
//!
//! The resolved [`RelayConfig`] is read once at startup and never mutated
//! by the relay loop.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Channel name. Taken from the command line, never from the file.
    #[serde(skip)]
    pub channel: String,
    pub receive: ReceiveConfig,
    pub forward: ForwardConfig,
    pub decimation: DecimationConfig,
    pub storage: StorageConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Local address the receive socket binds to.
    pub bind_addr: IpAddr,
    pub port: u16,
    /// SO_RCVBUF in bytes. 0 = OS default.
    pub recv_buffer_bytes: usize,
}

/// A datagram destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(addr: impl Into<IpAddr>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Multicast hop limit for both destinations.
    pub multicast_ttl: u32,
    /// Every received packet is sent here.
    pub full_rate: Endpoint,
    /// Every Nth packet is sent here when decimation is enabled.
    pub decimated: Endpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimationConfig {
    pub enabled: bool,
    /// Forward one packet in every `factor`. 0 and 1 forward everything.
    pub factor: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    /// Rotate once the current journal file reaches this many bytes.
    pub rotation_threshold: u64,
    /// Journal file names are `{file_prefix}_{unix_secs}_{seq}.avro`.
    pub file_prefix: String,
    /// fsync after every block instead of only on close.
    pub sync_each_block: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Seconds between periodic stats log lines. 0 = only at shutdown.
    pub interval_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_RX_PORT: u16 = 26000;
pub const DEFAULT_ROTATION_THRESHOLD: u64 = 50 * 1024 * 1024;

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel: String::from("default"),
            receive: ReceiveConfig::default(),
            forward: ForwardConfig::default(),
            decimation: DecimationConfig::default(),
            storage: StorageConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_RX_PORT,
            recv_buffer_bytes: 0,
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            multicast_ttl: 2,
            full_rate: Endpoint::new(Ipv4Addr::new(239, 1, 1, 1), 6000),
            decimated: Endpoint::new(Ipv4Addr::new(239, 1, 1, 2), 6001),
        }
    }
}

impl Default for DecimationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            factor: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./data"),
            rotation_threshold: DEFAULT_ROTATION_THRESHOLD,
            file_prefix: String::from("data"),
            sync_each_block: false,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("relay")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RelayConfig {
    /// Load config for a channel: env vars → file → defaults.
    pub fn load(channel: &str) -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&path, &text)?
        } else {
            RelayConfig::default()
        };
        config.channel = channel.to_string();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a config document. `origin` only labels errors.
    pub fn from_toml(origin: &std::path::Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::ParseFailed(origin.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("RELAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = RelayConfig::default().to_toml()?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)
    }

    /// Apply RELAY_* env var overrides from the process environment.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply RELAY_* overrides from an arbitrary lookup.
    ///
    /// Values that fail to parse are ignored and the previous value is kept.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RELAY_RX_PORT") {
            if let Ok(p) = v.trim().parse() {
                self.receive.port = p;
            }
        }
        if let Some(v) = lookup("RELAY_OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RELAY_DECIMATION_FACTOR") {
            if let Ok(f) = v.trim().parse() {
                self.decimation.factor = f;
            }
        }
        if let Some(v) = lookup("RELAY_DECIMATION_ENABLED") {
            self.decimation.enabled = v == "true" || v == "1";
        }
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.receive.port == 0 {
            return Err(ConfigError::Invalid("receive.port must be non-zero"));
        }
        if self.storage.rotation_threshold == 0 {
            return Err(ConfigError::Invalid(
                "storage.rotation_threshold must be non-zero",
            ));
        }
        if self.storage.file_prefix.is_empty() || self.storage.file_prefix.contains('/') {
            return Err(ConfigError::Invalid(
                "storage.file_prefix must be a non-empty file name",
            ));
        }
        Ok(())
    }

    /// Local address the receive socket binds to.
    pub fn receive_addr(&self) -> SocketAddr {
        SocketAddr::new(self.receive.bind_addr, self.receive.port)
    }
}
