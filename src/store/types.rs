//! Entities held by the store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use slirc_wire::casemap::irc_to_lower;
use slirc_wire::wildcard_match;

use super::modes::{ChannelModes, ModeChange, ModeKind, channel_mode_kind, parse_user_modes};

/// A user anywhere on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub nick: String,
    pub ident: String,
    /// Real host.
    pub host: String,
    /// Displayed host.
    pub dhost: String,
    pub ip: String,
    pub gecos: String,
    /// Nick timestamp, used for collision handling and SVSNICK.
    pub age: i64,
    pub signon: i64,
    pub idle_since: i64,
    /// Name of the server the user is attached to.
    pub server: String,
    pub modes: BTreeSet<char>,
    pub oper_type: Option<String>,
    pub away: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl User {
    pub fn mode_string(&self) -> String {
        let mut out = String::from("+");
        out.extend(self.modes.iter());
        out
    }

    pub fn apply_modes(&mut self, modes: &str) {
        for change in parse_user_modes(modes) {
            if change.adding {
                self.modes.insert(change.letter);
            } else {
                self.modes.remove(&change.letter);
            }
        }
    }

    pub fn hostmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.ident, self.dhost)
    }
}

/// Status prefixes a member holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberStatus {
    pub op: bool,
    pub halfop: bool,
    pub voice: bool,
}

impl MemberStatus {
    pub const OP: Self = Self {
        op: true,
        halfop: false,
        voice: false,
    };

    /// Parse prefix symbols, failing on the first unknown one.
    pub fn from_prefixes(prefixes: &str) -> Result<Self, char> {
        let mut status = Self::default();
        for symbol in prefixes.chars() {
            match symbol {
                '@' => status.op = true,
                '%' => status.halfop = true,
                '+' => status.voice = true,
                other => return Err(other),
            }
        }
        Ok(status)
    }

    /// Prefix symbols, highest first.
    pub fn prefixes(&self) -> String {
        let mut out = String::new();
        if self.op {
            out.push('@');
        }
        if self.halfop {
            out.push('%');
        }
        if self.voice {
            out.push('+');
        }
        out
    }

    /// Mode letters for the held prefixes.
    pub fn letters(&self) -> Vec<char> {
        let mut out = Vec::new();
        if self.op {
            out.push('o');
        }
        if self.halfop {
            out.push('h');
        }
        if self.voice {
            out.push('v');
        }
        out
    }

    pub fn has(&self, letter: char) -> bool {
        match letter {
            'o' => self.op,
            'h' => self.halfop,
            'v' => self.voice,
            _ => false,
        }
    }

    /// Set or clear a prefix by mode letter, returning whether it changed.
    pub fn set(&mut self, letter: char, on: bool) -> bool {
        let slot = match letter {
            'o' => &mut self.op,
            'h' => &mut self.halfop,
            'v' => &mut self.voice,
            _ => return false,
        };
        let changed = *slot != on;
        *slot = on;
        changed
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            op: self.op || other.op,
            halfop: self.halfop || other.halfop,
            voice: self.voice || other.voice,
        }
    }

    /// Whether this status meets a minimum prefix symbol.
    pub fn at_least(&self, symbol: char) -> bool {
        match symbol {
            '@' => self.op,
            '%' => self.op || self.halfop,
            '+' => self.op || self.halfop || self.voice,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub nick: String,
    pub status: MemberStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub text: String,
    pub setter: String,
    pub set_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    /// Creation timestamp; the arbiter in every join and mode conflict.
    pub ts: i64,
    pub modes: ChannelModes,
    pub topic: Option<Topic>,
    /// Keyed by lowercased nick.
    pub members: BTreeMap<String, Member>,
    pub metadata: BTreeMap<String, String>,
}

impl Channel {
    /// A new channel starts `+nt`.
    pub fn new(name: &str, ts: i64) -> Self {
        let mut modes = ChannelModes::default();
        modes.flags.extend(['n', 't']);
        Self {
            name: name.to_string(),
            ts,
            modes,
            topic: None,
            members: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn member(&self, nick: &str) -> Option<&Member> {
        self.members.get(&irc_to_lower(nick))
    }

    /// Add a member, or merge status into an existing membership.
    pub fn add_member(&mut self, nick: &str, status: MemberStatus) {
        self.members
            .entry(irc_to_lower(nick))
            .and_modify(|m| m.status = m.status.union(status))
            .or_insert_with(|| Member {
                nick: nick.to_string(),
                status,
            });
    }

    pub fn remove_member(&mut self, nick: &str) -> Option<Member> {
        self.members.remove(&irc_to_lower(nick))
    }

    /// Apply any change, status included. Returns whether state changed.
    pub fn apply_mode(&mut self, change: &ModeChange, setter: &str, now: i64) -> bool {
        match channel_mode_kind(change.letter) {
            ModeKind::Prefix(_) => {
                let Some(nick) = change.param.as_deref() else {
                    return false;
                };
                match self.members.get_mut(&irc_to_lower(nick)) {
                    Some(member) => member.status.set(change.letter, change.adding),
                    None => false,
                }
            }
            _ => self.modes.apply(change, setter, now),
        }
    }

    /// Remove every status prefix, returning the equivalent `-o`/`-h`/`-v` changes.
    pub fn strip_status(&mut self) -> Vec<ModeChange> {
        let mut removed = Vec::new();
        for member in self.members.values_mut() {
            for letter in member.status.letters() {
                removed.push(ModeChange::new(false, letter, Some(member.nick.as_str())));
            }
            member.status = MemberStatus::default();
        }
        removed
    }
}

/// Network ban categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum XLineKind {
    /// `ident@host` ban.
    G,
    /// IP ban.
    Z,
    /// Nick reservation.
    Q,
    /// Exception from G/K lines.
    E,
    /// Local `ident@host` ban. Accepted on ADDLINE but never burst.
    K,
}

impl XLineKind {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "G" => Some(Self::G),
            "Z" => Some(Self::Z),
            "Q" => Some(Self::Q),
            "E" => Some(Self::E),
            "K" => Some(Self::K),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Self::G => 'G',
            Self::Z => 'Z',
            Self::Q => 'Q',
            Self::E => 'E',
            Self::K => 'K',
        }
    }

    /// Client command that adds or removes this kind of line.
    pub fn command(self) -> &'static str {
        match self {
            Self::G => "GLINE",
            Self::Z => "ZLINE",
            Self::Q => "QLINE",
            Self::E => "ELINE",
            Self::K => "KLINE",
        }
    }

    pub fn from_command(command: &str) -> Option<Self> {
        match command {
            "GLINE" => Some(Self::G),
            "ZLINE" => Some(Self::Z),
            "QLINE" => Some(Self::Q),
            "ELINE" => Some(Self::E),
            "KLINE" => Some(Self::K),
            _ => None,
        }
    }

    /// Kinds propagated during a burst.
    pub fn is_global(self) -> bool {
        !matches!(self, Self::K)
    }
}

impl fmt::Display for XLineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XLine {
    pub kind: XLineKind,
    pub mask: String,
    pub setter: String,
    pub set_time: i64,
    /// Seconds; 0 is permanent.
    pub duration: i64,
    pub reason: String,
}

impl XLine {
    pub fn is_expired(&self, now: i64) -> bool {
        self.duration > 0 && now >= self.set_time + self.duration
    }

    pub fn matches(&self, user: &User) -> bool {
        match self.kind {
            XLineKind::Q => wildcard_match(&self.mask, &user.nick),
            XLineKind::Z => wildcard_match(&self.mask, &user.ip),
            XLineKind::G | XLineKind::K | XLineKind::E => {
                wildcard_match(&self.mask, &format!("{}@{}", user.ident, user.host))
                    || wildcard_match(&self.mask, &format!("{}@{}", user.ident, user.ip))
            }
        }
    }
}
