//! Protocol line grammar.
//!
//! ```text
//! [:origin] COMMAND [param ...] [:trailing parameter with spaces]
//! ```
//!
//! Unlike the client grammar there is no fifteen-parameter cap: burst lines
//! such as `NICK` introductions and stacked `FMODE` batches carry more.

use std::fmt;
use std::str::FromStr;

use nom::{
    IResult,
    bytes::complete::take_while1,
    character::complete::{char, space0},
    combinator::opt,
    sequence::preceded,
};
use smallvec::SmallVec;

use crate::error::{ProtocolError, Result};

/// A single parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Line {
    /// Origin (server name or nickname) without the leading `:`.
    pub origin: Option<String>,
    /// Command token, kept exactly as received.
    pub command: String,
    /// Parameters, the trailing one included.
    pub params: Vec<String>,
    /// Whether the last parameter is written in trailing (`:`) form.
    pub trailing: bool,
}

fn parse_origin(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

fn parse_command(input: &str) -> IResult<&str, &str> {
    take_while1(|c| c != ' ')(input)
}

/// Split parameters, returning them plus whether the last one was trailing.
fn parse_params(mut rest: &str) -> (SmallVec<[&str; 16]>, bool) {
    let mut params = SmallVec::new();
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            return (params, false);
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing);
            return (params, true);
        }
        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }
}

impl Line {
    /// Start building a line with the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            origin: None,
            command: command.into(),
            params: Vec::new(),
            trailing: false,
        }
    }

    /// Set the origin prefix.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Append a middle parameter.
    pub fn arg(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Append several middle parameters.
    pub fn args<I, T>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.params.extend(params.into_iter().map(Into::into));
        self
    }

    /// Append the final parameter in trailing form.
    pub fn trailing(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self.trailing = true;
        self
    }

    /// Parameter at `idx`, if present.
    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    /// Parse one line. Trailing CR/LF are ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim_end_matches(['\r', '\n']);
        if let Some(bad) = raw.chars().find(|c| *c == '\0' || *c == '\r' || *c == '\n') {
            return Err(ProtocolError::IllegalControlChar(bad));
        }
        let input = raw.trim_start_matches(' ');
        if input.is_empty() {
            return Err(ProtocolError::EmptyLine);
        }

        let missing = || ProtocolError::MissingCommand(raw.to_string());
        let (input, origin) = opt(parse_origin)(input).map_err(|_| missing())?;
        let (input, _) = space0::<_, nom::error::Error<&str>>(input).map_err(|_| missing())?;
        let (rest, command) = parse_command(input).map_err(|_| missing())?;
        let (params, trailing) = parse_params(rest);

        Ok(Self {
            origin: origin.map(str::to_string),
            command: command.to_string(),
            params: params.into_iter().map(str::to_string).collect(),
            trailing,
        })
    }
}

impl FromStr for Line {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(origin) = &self.origin {
            write!(f, ":{origin} ")?;
        }
        f.write_str(&self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let needs_colon = i == last
                && (self.trailing || param.is_empty() || param.contains(' ') || param.starts_with(':'));
            if needs_colon {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}
