//! # slirc-wire
//!
//! Wire-level building blocks for the spanning-tree server link protocol:
//!
//! - [`Line`]: parse and serialize `[:origin] COMMAND params... [:trailing]`
//! - [`LineCodec`]: CRLF framing with a maximum line length (feature `codec`)
//! - [`casemap`]: RFC 1459 case-insensitive comparison for nicks, channels and server names
//! - [`wildcard_match`]: `*`/`?` glob matching used for server masks and bans

#![deny(clippy::all)]

pub mod casemap;
#[cfg(feature = "codec")]
mod codec;
mod error;
mod line;
mod mask;

#[cfg(feature = "codec")]
pub use codec::LineCodec;
pub use error::{ProtocolError, Result};
pub use line::Line;
pub use mask::wildcard_match;
