//! Protocol limits.
//!
//! Both ends of a link must agree on every value here; they are advertised
//! in `CAPAB CAPABILITIES` and any difference aborts the link.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_nickmax")]
    pub nickmax: usize,
    #[serde(default = "default_chanmax")]
    pub chanmax: usize,
    /// Parameterised modes per line; also the FMODE batch size for bursts.
    #[serde(default = "default_maxmodes")]
    pub maxmodes: usize,
    #[serde(default = "default_identmax")]
    pub identmax: usize,
    #[serde(default = "default_maxquit")]
    pub maxquit: usize,
    #[serde(default = "default_maxtopic")]
    pub maxtopic: usize,
    #[serde(default = "default_maxkick")]
    pub maxkick: usize,
    #[serde(default = "default_maxgecos")]
    pub maxgecos: usize,
    #[serde(default = "default_maxaway")]
    pub maxaway: usize,
    #[serde(default = "default_true")]
    pub halfop: bool,
    /// We listen on IPv6 natively.
    #[serde(default)]
    pub ip6_native: bool,
    /// We can link with IPv6 servers.
    #[serde(default = "default_true")]
    pub ip6_support: bool,
    /// Longest line accepted from a peer, CRLF included.
    #[serde(default = "default_max_line")]
    pub max_line: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            nickmax: default_nickmax(),
            chanmax: default_chanmax(),
            maxmodes: default_maxmodes(),
            identmax: default_identmax(),
            maxquit: default_maxquit(),
            maxtopic: default_maxtopic(),
            maxkick: default_maxkick(),
            maxgecos: default_maxgecos(),
            maxaway: default_maxaway(),
            halfop: true,
            ip6_native: false,
            ip6_support: true,
            max_line: default_max_line(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_nickmax() -> usize {
    32
}

fn default_chanmax() -> usize {
    64
}

fn default_maxmodes() -> usize {
    20
}

fn default_identmax() -> usize {
    12
}

fn default_maxquit() -> usize {
    255
}

fn default_maxtopic() -> usize {
    307
}

fn default_maxkick() -> usize {
    255
}

fn default_maxgecos() -> usize {
    128
}

fn default_maxaway() -> usize {
    200
}

fn default_max_line() -> usize {
    512
}
