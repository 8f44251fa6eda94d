//! Configuration system for Lanchat.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LANCHAT_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/lanchat/config.toml
//!   3. ~/.config/lanchat/config.toml

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LanchatConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Display name announced in presence datagrams.
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address both sockets bind to.
    pub bind_addr: IpAddr,
    /// UDP port for presence, chat and handshake datagrams. 0 = OS-assigned.
    pub udp_port: u16,
    /// TCP port for file data. 0 = OS-assigned.
    pub tcp_port: u16,
    /// UDP port peers listen on. 0 = same as `udp_port`.
    pub peer_udp_port: u16,
    /// TCP port peers listen on. 0 = same as `tcp_port`.
    pub peer_tcp_port: u16,
    /// Presence destinations. Empty = every local interface's broadcast address.
    pub broadcast_addrs: Vec<Ipv4Addr>,
    /// Local HTTP control API port.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Presence broadcast and peer sweep cadence.
    pub heartbeat_secs: u64,
    /// A peer silent for longer than this is considered offline.
    pub peer_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Sender-side TCP connect timeout.
    pub connect_timeout_secs: u64,
    /// How long an accepted inbound file may wait for the sender to connect.
    pub accept_window_secs: u64,
    /// Default save directory offered to the user for incoming files.
    pub download_dir: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            username: "anonymous".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            udp_port: DEFAULT_UDP_PORT,
            tcp_port: DEFAULT_TCP_PORT,
            peer_udp_port: 0,
            peer_tcp_port: 0,
            broadcast_addrs: Vec::new(),
            api_port: 9101,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 10,
            peer_ttl_secs: 30,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            accept_window_secs: 60,
            download_dir: data_dir().join("downloads"),
        }
    }
}

impl NetworkConfig {
    /// Port to address UDP datagrams to.
    pub fn effective_peer_udp_port(&self) -> u16 {
        if self.peer_udp_port == 0 {
            self.udp_port
        } else {
            self.peer_udp_port
        }
    }

    /// Port to open file connections to.
    pub fn effective_peer_tcp_port(&self) -> u16 {
        if self.peer_tcp_port == 0 {
            self.tcp_port
        } else {
            self.peer_tcp_port
        }
    }
}

impl DiscoveryConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn peer_ttl(&self) -> Duration {
        Duration::from_secs(self.peer_ttl_secs)
    }
}

impl TransferConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Never shorter than the sender's connect timeout.
    pub fn accept_window(&self) -> Duration {
        Duration::from_secs(self.accept_window_secs.max(self.connect_timeout_secs))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("lanchat")
}

/// Per-user data directory (`$XDG_DATA_HOME/lanchat`).
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("lanchat")
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
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LanchatConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            Self::from_toml(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            LanchatConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML document; absent sections and fields take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LANCHAT_CONFIG")
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
            let text = toml::to_string_pretty(&LanchatConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply LANCHAT_* overrides. `lookup` is `std::env::var` in production.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("LANCHAT_IDENTITY__USERNAME") {
            let v = v.trim();
            if !v.is_empty() {
                self.identity.username = v.to_string();
            }
        }
        if let Some(v) = lookup("LANCHAT_NETWORK__BIND_ADDR") {
            if let Ok(addr) = v.parse() {
                self.network.bind_addr = addr;
            }
        }
        if let Some(p) = lookup("LANCHAT_NETWORK__UDP_PORT").and_then(|v| v.parse().ok()) {
            self.network.udp_port = p;
        }
        if let Some(p) = lookup("LANCHAT_NETWORK__TCP_PORT").and_then(|v| v.parse().ok()) {
            self.network.tcp_port = p;
        }
        if let Some(p) = lookup("LANCHAT_NETWORK__API_PORT").and_then(|v| v.parse().ok()) {
            self.network.api_port = p;
        }
    }
}
