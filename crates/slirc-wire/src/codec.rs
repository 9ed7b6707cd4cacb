//! CRLF line framing for tokio.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// Default maximum line length in bytes, terminator included.
pub const DEFAULT_MAX_LEN: usize = 512;

/// Frames a byte stream into lines.
///
/// Decoded lines have their `\r\n` (or bare `\n`) stripped. Encoded lines
/// get `\r\n` appended. Lines longer than `max_len` are an error, which
/// the link layer treats as a protocol violation.
#[derive(Debug, Clone)]
pub struct LineCodec {
    next_index: usize,
    max_len: usize,
}

impl LineCodec {
    /// Codec with the default 512-byte limit.
    pub fn new() -> Self {
        Self::with_max_len(DEFAULT_MAX_LEN)
    }

    /// Codec with a custom limit.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.next_index = src.len();
                if src.len() > self.max_len {
                    return Err(ProtocolError::MessageTooLong {
                        actual: src.len(),
                        limit: self.max_len,
                    });
                }
                return Ok(None);
            };

            let frame = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;
            if frame.len() > self.max_len {
                return Err(ProtocolError::MessageTooLong {
                    actual: frame.len(),
                    limit: self.max_len,
                });
            }

            let body = frame
                .strip_suffix(b"\n")
                .map(|b| b.strip_suffix(b"\r").unwrap_or(b))
                .unwrap_or(&frame[..]);
            // Blank keepalive lines are skipped rather than surfaced.
            if body.is_empty() {
                continue;
            }
            return match std::str::from_utf8(body) {
                Ok(s) => Ok(Some(s.to_string())),
                Err(e) => Err(ProtocolError::InvalidUtf8 {
                    byte_pos: e.valid_up_to(),
                }),
            };
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<()> {
        let line = line.as_ref();
        dst.reserve(line.len() + 2);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}
