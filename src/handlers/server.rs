//! CONNECTED-state command handlers.
//!
//! Each submodule serves one family of commands from the dispatch table.
//! Handlers relay what they accept onward, never back over the link it
//! arrived on.

pub mod burst;
pub mod fjoin;
pub mod fmode;
pub mod kick;
pub mod kill;
pub mod metadata;
pub mod notice;
pub mod ping;
pub mod query;
pub mod routing;
pub mod squit;
pub mod svs;
pub mod time;
pub mod topic;
pub mod uid;
pub mod xline;

use slirc_wire::wildcard_match;

use crate::store::EntityStore;
use crate::sync::SyncManager;

impl<S: EntityStore> SyncManager<S> {
    /// Write `line` to every local member of `chan`.
    pub(crate) fn deliver_channel(&mut self, chan: &str, line: &str) {
        let Some(channel) = self.store.channel(chan) else {
            return;
        };
        let local: Vec<String> = channel
            .members
            .values()
            .map(|m| m.nick.clone())
            .filter(|nick| self.is_local_user(nick))
            .collect();
        for nick in local {
            self.store.deliver(&nick, line);
        }
    }

    /// Write `line` to `nick` if the user is attached here.
    pub(crate) fn deliver_local(&mut self, nick: &str, line: &str) -> bool {
        if !self.is_local_user(nick) {
            return false;
        }
        self.store.deliver(nick, line);
        true
    }

    /// Whether a server mask names this server.
    pub(crate) fn mask_is_us(&self, mask: &str) -> bool {
        wildcard_match(mask, &self.config.server.name)
    }
}
