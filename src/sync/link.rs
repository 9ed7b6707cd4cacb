//! Per-socket link state.

use std::fmt;
use std::net::SocketAddr;

use crate::config::LinkBlock;

use super::capab::Capabilities;

/// Handle for one transport session, assigned by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Link state machine.
///
/// ```text
/// inbound:   WaitAuth1 --SERVER--> WaitAuth2 --BURST--> Connected
/// outbound:  Connecting --SERVER--> WaitAuth2 --(our BURST)--> Connected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// Accept-only socket. Never carries protocol lines.
    Listener,
    /// Outbound, waiting for transport connect and then the peer's SERVER reply.
    Connecting,
    /// Accepted, waiting for the peer's SERVER line.
    WaitAuth1,
    /// Credentials exchanged, waiting for the burst to start.
    WaitAuth2,
    /// Authenticated. Steady-state dispatch.
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One live or pending session with another server.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    pub id: ConnId,
    pub state: LinkState,
    pub direction: Direction,
    pub addr: Option<SocketAddr>,
    /// Link block an outbound attempt was made for.
    pub link: Option<LinkBlock>,
    /// Peer's server name, known once its SERVER line is accepted.
    pub remote_name: Option<String>,
    pub remote_desc: String,
    pub capab: Capabilities,
    /// The peer is still sending its burst.
    pub bursting: bool,
    /// Network bans were recorded during the burst but not yet enforced.
    pub lines_pending: bool,
    /// Handshake must finish by this time.
    pub deadline: Option<i64>,
}

impl PeerConnection {
    pub fn new(id: ConnId, state: LinkState, direction: Direction) -> Self {
        Self {
            id,
            state,
            direction,
            addr: None,
            link: None,
            remote_name: None,
            remote_desc: String::new(),
            capab: Capabilities::default(),
            bursting: false,
            lines_pending: false,
            deadline: None,
        }
    }

    /// Best available name for log lines and notices.
    pub fn label(&self) -> String {
        if let Some(name) = &self.remote_name {
            return name.clone();
        }
        if let Some(link) = &self.link {
            return link.name.clone();
        }
        self.addr
            .map(|a| a.ip().to_string())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Side effects requested by the manager, performed by the network layer.
#[derive(Debug, Clone)]
pub enum Action {
    /// Write one line (without CRLF).
    Send { conn: ConnId, line: String },
    /// Flush pending writes, then close.
    Close { conn: ConnId },
    /// Open an outbound connection for `link` and report back as `conn`.
    Connect { conn: ConnId, link: Box<LinkBlock> },
    /// A remote REHASH matched this server.
    Rehash,
}
