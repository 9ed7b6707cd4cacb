//! Logging setup and span constructors.

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Install the global subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Standardized span constructors for link observability.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span covering one peer socket, from accept/connect to close.
    pub fn link(conn: u64, addr: &str) -> Span {
        info_span!("link", conn = conn, addr = %addr)
    }

    /// Span for an outbound connection attempt.
    pub fn connect(name: &str) -> Span {
        info_span!("connect", peer = %name)
    }

    /// Span for processing one inbound line.
    pub fn line(peer: &str, command: &str) -> Span {
        tracing::debug_span!("line", peer = %peer, command = %command)
    }
}
