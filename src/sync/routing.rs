//! Propagation.
//!
//! Every line leaving this server goes through one of these helpers. In a
//! tree each server is reachable through exactly one direct peer, so
//! "everyone but the sender" can never loop and a targeted line needs one
//! lookup.

use std::collections::BTreeSet;

use slirc_wire::Line;
use slirc_wire::casemap::irc_eq;
use tracing::debug;

use crate::handlers::Context;
use crate::store::EntityStore;

use super::link::ConnId;
use super::manager::SyncManager;

impl<S: EntityStore> SyncManager<S> {
    /// Connections of every directly attached server.
    pub(crate) fn peer_conns(&self) -> Vec<ConnId> {
        self.topology
            .direct_peers()
            .into_iter()
            .filter_map(|id| self.topology.get(id).and_then(|n| n.conn))
            .collect()
    }

    /// Broadcast to every direct peer.
    pub(crate) fn to_all(&mut self, line: &str) {
        self.to_all_but(None, line);
    }

    /// Broadcast to every direct peer except the one a line arrived on.
    pub(crate) fn to_all_but(&mut self, except: Option<ConnId>, line: &str) {
        for conn in self.peer_conns() {
            if Some(conn) != except {
                self.send(conn, line);
            }
        }
    }

    /// Send toward one server. Returns false (and drops the line) when no
    /// route exists.
    pub(crate) fn to_server(&mut self, server: &str, line: &str) -> bool {
        match self.topology.best_route_to(server) {
            Some(conn) => {
                self.send(conn, line);
                true
            }
            None => {
                debug!(server = %server, "no route; line dropped");
                false
            }
        }
    }

    /// Send toward the server a user is attached to.
    pub(crate) fn to_user(&mut self, nick: &str, line: &str) -> bool {
        match self.user_route(nick) {
            Some(conn) => {
                self.send(conn, line);
                true
            }
            None => false,
        }
    }

    /// Next hop toward `nick`. `None` for local and unknown users.
    pub(crate) fn user_route(&self, nick: &str) -> Option<ConnId> {
        let server = &self.store.user(nick)?.server;
        self.topology.best_route_to(server)
    }

    /// Next hop toward an origin that may be a nick or a server name.
    pub(crate) fn route_of_origin(&self, origin: &str) -> Option<ConnId> {
        match self.store.user(origin) {
            Some(user) => self.topology.best_route_to(&user.server),
            None => self.topology.best_route_to(origin),
        }
    }

    pub(crate) fn is_server(&self, name: &str) -> bool {
        self.topology.find_by_name(name).is_some()
    }

    /// Connections with at least one member of `chan` behind them.
    ///
    /// `status` keeps only members holding that prefix or better. Members
    /// named in `exempt` are skipped. Each connection appears once.
    pub(crate) fn channel_routes(&self, chan: &str, status: Option<char>, exempt: &[String]) -> BTreeSet<ConnId> {
        let Some(channel) = self.store.channel(chan) else {
            return BTreeSet::new();
        };
        channel
            .members
            .values()
            .filter(|m| status.is_none_or(|s| m.status.at_least(s)))
            .filter(|m| !exempt.iter().any(|e| irc_eq(e, &m.nick)))
            .filter_map(|m| self.user_route(&m.nick))
            .collect()
    }

    /// Send to every connection with a qualifying member of `chan`, except
    /// `omit`.
    pub(crate) fn to_channel(
        &mut self,
        chan: &str,
        status: Option<char>,
        exempt: &[String],
        omit: Option<ConnId>,
        line: &str,
    ) {
        for conn in self.channel_routes(chan, status, exempt) {
            if Some(conn) != omit {
                self.send(conn, line);
            }
        }
    }

    /// Pass a received line on unchanged.
    ///
    /// Messages and notices only travel toward their recipients; everything
    /// else goes to every peer but the sender.
    pub(crate) fn relay_raw(&mut self, ctx: &Context<'_>, line: &Line) {
        let sender = Some(ctx.conn);
        if matches!(line.command.as_str(), "PRIVMSG" | "NOTICE")
            && line.params.len() >= 2
            && let Some(target) = line.param(0)
        {
            let bare = target.trim_start_matches(['@', '%', '+']);
            if bare.starts_with('#') {
                let status = target.chars().next().filter(|c| matches!(c, '@' | '%' | '+'));
                self.to_channel(bare, status, &[], sender, ctx.raw);
                return;
            }
            if !bare.starts_with('$') {
                if let Some(conn) = self.user_route(bare)
                    && Some(conn) != sender
                {
                    self.send(conn, ctx.raw);
                }
                return;
            }
        }
        self.to_all_but(sender, ctx.raw);
    }
}
