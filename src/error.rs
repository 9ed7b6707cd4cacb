//! Unified error handling for the link layer.
//!
//! Every failure a peer can cause ends in the same place: an `ERROR` line
//! (where one is owed), the connection closed, and its subtree torn down.
//! Nothing here is fatal to the process.

use thiserror::Error;

/// Why a link is being closed.
///
/// The `Display` text is exactly what follows `ERROR :` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Malformed line, or a command not valid in the current state.
    #[error("{0}")]
    Protocol(String),

    /// Capability or limit mismatch found at `CAPAB END`.
    #[error("CAPAB negotiation failed: {0}")]
    Negotiation(String),

    /// Name/password pair did not match any link block.
    #[error("{0}")]
    Credentials(String),

    /// Server introduction that would break the tree.
    #[error("{0}")]
    Topology(String),

    /// The peer is gone or told us why it is leaving. Nothing is sent back.
    #[error("{0}")]
    Closed(String),
}

impl LinkError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol(reason.into())
    }

    /// The `ERROR` line to send before closing, if any.
    pub fn error_line(&self) -> Option<String> {
        match self {
            Self::Closed(_) => None,
            other => Some(format!("ERROR :{other}")),
        }
    }
}

/// Result type returned by every line handler.
pub type HandlerResult = Result<(), LinkError>;

/// Outbound connection failures reported by the network layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("DNS lookup failed: {0}")]
    Resolve(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("certificate fingerprint mismatch (expected {expected}, got {actual})")]
    Fingerprint { expected: String, actual: String },
    #[error("connection timed out")]
    Timeout,
}
