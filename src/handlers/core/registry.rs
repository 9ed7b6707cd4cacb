//! Line handler registry and dispatch table.
//!
//! The table maps `(link state, command)` to a handler function. Each state
//! also has a fallback for commands it does not list, so every line a peer
//! can send has exactly one place it goes.

use std::collections::HashMap;

use crate::handlers::server;
use crate::store::EntityStore;
use crate::sync::LinkState;
use crate::sync::handshake;

use super::context::Handler;

struct StateTable<S: EntityStore> {
    handlers: HashMap<&'static str, Handler<S>>,
    fallback: Handler<S>,
}

impl<S: EntityStore> StateTable<S> {
    fn new(fallback: Handler<S>) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback,
        }
    }

    fn on(mut self, command: &'static str, handler: Handler<S>) -> Self {
        self.handlers.insert(command, handler);
        self
    }
}

/// Registry of line handlers.
pub struct Registry<S: EntityStore> {
    states: HashMap<LinkState, StateTable<S>>,
    /// Lines received per command, for STATS m.
    command_counts: HashMap<String, u64>,
}

impl<S: EntityStore> Registry<S> {
    pub fn new() -> Self {
        let mut states = HashMap::new();

        states.insert(
            LinkState::Listener,
            StateTable::new(handshake::listener_line),
        );

        // Connecting: only the peer's SERVER reply moves us on.
        states.insert(
            LinkState::Connecting,
            StateTable::new(handshake::ignore)
                .on("SERVER", handshake::outbound_reply)
                .on("ERROR", handshake::error)
                .on("CAPAB", handshake::capab),
        );

        states.insert(
            LinkState::WaitAuth1,
            StateTable::new(handshake::invalid_in_negotiation)
                .on("PASS", handshake::ignore)
                .on("SERVER", handshake::inbound_server)
                .on("ERROR", handshake::error)
                .on("USER", handshake::client_on_server_port)
                .on("CAPAB", handshake::capab)
                .on("U", handshake::old_mesh)
                .on("S", handshake::old_mesh),
        );

        states.insert(
            LinkState::WaitAuth2,
            StateTable::new(handshake::ignore)
                .on("SERVER", handshake::ignore)
                .on("U", handshake::old_mesh)
                .on("S", handshake::old_mesh)
                .on("BURST", handshake::burst_start)
                .on("ERROR", handshake::error)
                .on("CAPAB", handshake::capab),
        );

        states.insert(
            LinkState::Connected,
            StateTable::new(server::routing::fallback)
                // Burst bracket
                .on("BURST", handshake::ignore)
                .on("CAPAB", handshake::ignore)
                .on("ENDBURST", server::burst::endburst)
                // Topology
                .on("SERVER", server::squit::server)
                .on("SQUIT", server::squit::squit)
                .on("RSQUIT", server::squit::rsquit)
                .on("ERROR", handshake::error)
                .on("VERSION", server::query::version)
                // Users
                .on("NICK", server::uid::nick)
                .on("OPERTYPE", server::uid::opertype)
                .on("FHOST", server::uid::fhost)
                .on("FNAME", server::uid::fname)
                .on("KILL", server::kill::kill)
                .on("SVSNICK", server::svs::svsnick)
                .on("SVSJOIN", server::svs::svsjoin)
                // Channels
                .on("FJOIN", server::fjoin::fjoin)
                .on("REMSTATUS", server::fjoin::remstatus)
                .on("FMODE", server::fmode::fmode)
                .on("FTOPIC", server::topic::ftopic)
                .on("KICK", server::kick::kick)
                // Bans and metadata
                .on("ADDLINE", server::xline::addline)
                .on("METADATA", server::metadata::metadata)
                // Liveness and time
                .on("PING", server::ping::ping)
                .on("PONG", server::ping::pong)
                .on("TIMESET", server::time::timeset)
                .on("TIME", server::time::time)
                // Remote queries
                .on("STATS", server::query::stats)
                .on("MOTD", server::query::motd)
                .on("ADMIN", server::query::admin)
                .on("IDLE", server::query::idle)
                .on("PUSH", server::query::push)
                // Notices
                .on("REHASH", server::notice::rehash)
                .on("OPERNOTICE", server::notice::opernotice)
                .on("MODENOTICE", server::notice::modenotice)
                .on("SNONOTICE", server::notice::snonotice),
        );

        Self {
            states,
            command_counts: HashMap::new(),
        }
    }

    /// Handler for `command` in `state`, counting the lookup.
    pub fn lookup(&mut self, state: LinkState, command: &str) -> Handler<S> {
        *self.command_counts.entry(command.to_string()).or_default() += 1;
        match self.states.get(&state) {
            Some(table) => table.handlers.get(command).copied().unwrap_or(table.fallback),
            None => handshake::ignore as Handler<S>,
        }
    }

    /// Commands received so far with their counts, busiest first.
    pub fn command_counts(&self) -> Vec<(&str, u64)> {
        let mut counts: Vec<(&str, u64)> = self
            .command_counts
            .iter()
            .map(|(c, n)| (c.as_str(), *n))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        counts
    }
}

impl<S: EntityStore> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}
