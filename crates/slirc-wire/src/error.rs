//! Error types for line parsing and framing.

use thiserror::Error;

/// Convenience alias for results carrying a [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised while framing or parsing a protocol line.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error from the underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The line was not valid UTF-8.
    #[error("invalid utf-8 at byte {byte_pos}")]
    InvalidUtf8 {
        /// Offset of the first invalid byte.
        byte_pos: usize,
    },

    /// The line exceeded the codec's length limit.
    #[error("line too long: {actual} bytes (limit {limit})")]
    MessageTooLong {
        /// Length of the offending line.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The line was empty after stripping whitespace.
    #[error("empty line")]
    EmptyLine,

    /// The line had an origin prefix but no command token.
    #[error("missing command in line: {0:?}")]
    MissingCommand(String),

    /// A NUL or bare CR was found inside the line.
    #[error("illegal control character {0:?}")]
    IllegalControlChar(char),
}
