//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

use super::limits::LimitsConfig;
use super::links::{LinkBlock, TransportHook};
use super::policy::SyncConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Link listeners.
    #[serde(default)]
    pub listen: Vec<ListenConfig>,
    /// Certificate for listeners using the TLS transport hook.
    pub tls: Option<TlsConfig>,
    /// Permitted peers.
    #[serde(default, rename = "link")]
    pub links: Vec<LinkBlock>,
    /// Limits advertised and checked during CAPAB.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Synchronization policy.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Our server name (e.g., "hub.straylight.net").
    pub name: String,
    /// Description shown in SERVER introductions, MAP and LINKS.
    pub description: String,
    /// Version string announced in bursts.
    #[serde(default = "default_version")]
    pub version: String,
    /// Administrative contact returned for ADMIN.
    #[serde(default)]
    pub admin: AdminInfo,
    /// Message of the day lines returned for remote MOTD.
    #[serde(default)]
    pub motd: Vec<String>,
}

fn default_version() -> String {
    concat!("slircd-link-", env!("CARGO_PKG_VERSION")).to_string()
}

/// ADMIN reply contents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub email: String,
}

/// One listening socket for inbound links.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind (e.g., "0.0.0.0:7000").
    pub address: SocketAddr,
    /// Transport hook applied to every accepted socket.
    #[serde(default)]
    pub transport: Option<TransportHook>,
}

/// Certificate and key for inbound TLS.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate chain (PEM).
    pub cert_path: String,
    /// Path to private key (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}
