//! Local entity store.
//!
//! The link layer never owns users, channels or bans itself; it reads and
//! mutates them through [`EntityStore`]. A client-serving daemon plugs its
//! own state in here. [`MemoryStore`] backs the standalone hub and tests.

mod memory;
pub mod modes;
mod types;

pub use memory::{Delivery, MemoryStore};
pub use types::{Channel, Member, MemberStatus, Topic, User, XLine, XLineKind};

/// Result of running a relayed client command as a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Executed; the line should continue through the network.
    Success,
    /// Recognised but rejected (bad target, not a member, ...). Stop here.
    Failure,
    /// Not a command this server knows. The link is closed.
    Invalid,
}

pub trait EntityStore: Send {
    // ---- users -------------------------------------------------------------

    fn user(&self, nick: &str) -> Option<&User>;
    fn user_mut(&mut self, nick: &str) -> Option<&mut User>;
    fn users(&self) -> Vec<&User>;
    fn add_user(&mut self, user: User);
    /// Remove a user and all its memberships. Emptied channels are dropped.
    fn remove_user(&mut self, nick: &str, reason: &str) -> Option<User>;
    /// Change a nick everywhere it appears. Fails if `new` is taken by someone else.
    fn rename_user(&mut self, old: &str, new: &str, ts: i64) -> bool;

    // ---- channels ----------------------------------------------------------

    fn channel(&self, name: &str) -> Option<&Channel>;
    fn channel_mut(&mut self, name: &str) -> Option<&mut Channel>;
    fn channels(&self) -> Vec<&Channel>;
    /// Fetch a channel, creating it with `ts` if absent.
    fn create_channel(&mut self, name: &str, ts: i64) -> &mut Channel;
    fn remove_channel(&mut self, name: &str) -> Option<Channel>;

    // ---- network bans ------------------------------------------------------

    fn xlines(&self) -> Vec<&XLine>;
    /// Record a ban without enforcing it. Returns false if it already exists.
    fn add_xline(&mut self, line: XLine) -> bool;
    fn remove_xline(&mut self, kind: XLineKind, mask: &str) -> bool;
    /// Enforce recorded bans against local users, returning `(nick, reason)`
    /// for each one disconnected.
    fn apply_xlines(&mut self, now: i64) -> Vec<(String, String)>;

    // ---- network-wide metadata ---------------------------------------------

    fn network_metadata(&self) -> Vec<(String, String)>;
    fn set_network_metadata(&mut self, key: &str, value: &str);

    // ---- local side effects ------------------------------------------------

    /// Run a client command as `nick`, as if typed by that user.
    fn execute_as(&mut self, nick: &str, command: &str, params: &[String], now: i64) -> CommandOutcome;
    /// Write a raw line to a local user.
    fn deliver(&mut self, nick: &str, line: &str);
    /// Server notice to operators subscribed to `snomask`.
    fn server_notice(&mut self, snomask: char, text: &str);
    /// Notice to every operator.
    fn oper_notice(&mut self, text: &str);
    /// Notice to users with all of `modes` set.
    fn mode_notice(&mut self, modes: &str, text: &str);

    // ---- provided ----------------------------------------------------------

    /// Part a user, dropping the channel when it empties.
    fn part(&mut self, chan: &str, nick: &str) -> bool {
        let Some(channel) = self.channel_mut(chan) else {
            return false;
        };
        let removed = channel.remove_member(nick).is_some();
        if channel.members.is_empty() {
            self.remove_channel(chan);
        }
        removed
    }

    /// Nicks of users attached to `server`.
    fn users_on(&self, server: &str) -> Vec<String> {
        self.users()
            .into_iter()
            .filter(|u| slirc_wire::casemap::irc_eq(&u.server, server))
            .map(|u| u.nick.clone())
            .collect()
    }

    /// Channels `nick` is a member of.
    fn channels_of(&self, nick: &str) -> Vec<String> {
        self.channels()
            .into_iter()
            .filter(|c| c.member(nick).is_some())
            .map(|c| c.name.clone())
            .collect()
    }
}
