//! Server-to-server link configuration.

use ipnet::IpNet;
use serde::Deserialize;
use std::net::IpAddr;

/// Transport hook applied to a link's socket before any protocol line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportHook {
    Tls,
}

/// Link block configuration for server-to-server connections.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkBlock {
    /// Remote server name (e.g., "leaf.straylight.net").
    pub name: String,
    /// Remote server IP/hostname to connect to.
    pub hostname: String,
    /// Remote server port.
    pub port: u16,
    /// Password we send in our SERVER line.
    pub send_password: String,
    /// Password we expect in the remote SERVER line.
    pub recv_password: String,
    /// Additional CIDR range inbound connections for this link may come from.
    #[serde(default)]
    pub allow_mask: Option<String>,
    /// Transport hook (only "tls" is built in).
    #[serde(default)]
    pub transport: Option<TransportHook>,
    /// Whether to verify the remote certificate (only applies with the TLS hook).
    #[serde(default = "default_true")]
    pub verify_cert: bool,
    /// Certificate fingerprint for pinning (SHA-256, hex, colons optional).
    #[serde(default)]
    pub cert_fingerprint: Option<String>,
    /// Autoconnect interval in seconds. 0 disables autoconnect.
    #[serde(default)]
    pub autoconnect: u64,
    /// Link to try immediately if an outbound attempt to this one fails.
    #[serde(default)]
    pub failover: Option<String>,
    /// Seconds allowed for connect plus handshake.
    #[serde(default = "default_link_timeout")]
    pub timeout: u64,
    /// Hide this link from LINKS and MAP for non-operators.
    #[serde(default)]
    pub hidden: bool,
    /// Local address to bind outbound connections to.
    #[serde(default)]
    pub bind: Option<IpAddr>,
}

fn default_true() -> bool {
    true
}

fn default_link_timeout() -> u64 {
    10
}

impl LinkBlock {
    pub fn uses_tls(&self) -> bool {
        self.transport == Some(TransportHook::Tls)
    }

    /// Whether an inbound connection from `ip` may belong to this link.
    pub fn allows(&self, ip: IpAddr) -> bool {
        if self.hostname.parse::<IpAddr>().is_ok_and(|h| h == ip) {
            return true;
        }
        self.allow_mask
            .as_deref()
            .and_then(|m| m.parse::<IpNet>().ok())
            .is_some_and(|net| net.contains(&ip))
    }
}
