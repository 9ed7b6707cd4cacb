//! Link synchronization policy.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Correct clock skew at link time and honour TIMESET.
    #[serde(default = "default_true")]
    pub time_sync: bool,
    /// Send `BURST <ts> FORCE` so peers adopt our clock unconditionally.
    #[serde(default)]
    pub time_master: bool,
    /// Seconds between TIMESET broadcasts.
    #[serde(default = "default_timesync_interval")]
    pub timesync_interval: u64,
    /// Seconds between PINGs to directly attached peers.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Largest tolerated clock difference at link time, in seconds.
    #[serde(default = "default_max_clock_skew")]
    pub max_clock_skew: i64,
    /// Trust-tier servers (typically services).
    #[serde(default)]
    pub trusted_peers: Vec<String>,
    /// Accept FMODE from trust-tier servers regardless of timestamp.
    #[serde(default = "default_true")]
    pub trusted_bypass_ts: bool,
    /// Tell local channel members when an FJOIN lowers their channel's TS.
    #[serde(default)]
    pub announce_ts_change: bool,
    /// Omit trust-tier servers from LINKS and MAP.
    #[serde(default)]
    pub hide_ulines: bool,
    /// Show every server as directly attached to us in LINKS.
    #[serde(default)]
    pub flat_links: bool,
    /// Protocol-affecting modules advertised in `CAPAB MODULES`.
    #[serde(default)]
    pub modules: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            time_sync: true,
            time_master: false,
            timesync_interval: default_timesync_interval(),
            ping_interval: default_ping_interval(),
            max_clock_skew: default_max_clock_skew(),
            trusted_peers: Vec::new(),
            trusted_bypass_ts: true,
            announce_ts_change: false,
            hide_ulines: false,
            flat_links: false,
            modules: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timesync_interval() -> u64 {
    43200
}

fn default_ping_interval() -> u64 {
    60
}

fn default_max_clock_skew() -> i64 {
    600
}

impl SyncConfig {
    /// Whether `server` belongs to the trust tier.
    pub fn is_trusted(&self, server: &str) -> bool {
        self.trusted_peers
            .iter()
            .any(|t| slirc_wire::casemap::irc_eq(t, server))
    }
}
