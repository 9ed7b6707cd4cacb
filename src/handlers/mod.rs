//! Protocol line handlers.
//!
//! This module contains the dispatch table and the handlers for every
//! command a linked server can send. [`SyncManager::handle_line`] is the
//! single entry point for received lines.

pub mod core;
pub mod server;

pub use self::core::{Context, Handler, Registry};

use slirc_wire::{Line, ProtocolError};
use tracing::debug;

use crate::error::LinkError;
use crate::store::EntityStore;
use crate::sync::{ConnId, LinkState, SyncManager};
use crate::telemetry::spans;

impl<S: EntityStore> SyncManager<S> {
    /// Process one line received on `conn`.
    ///
    /// On a CONNECTED link a line whose origin does not sit behind `conn`
    /// is dropped. Any handler error closes the link.
    pub fn handle_line(&mut self, conn: ConnId, raw: &str) {
        let Some(peer) = self.conns.get(&conn) else {
            return;
        };
        let state = peer.state;
        let peer_name = peer.label();

        let raw = raw.trim_end_matches(['\r', '\n']);
        let mut line = match Line::parse(raw) {
            Ok(line) => line,
            Err(ProtocolError::EmptyLine) => return,
            Err(e) => {
                self.close_link(conn, LinkError::Protocol(format!("Malformed line: {e}")));
                return;
            }
        };
        let _span = spans::line(&peer_name, &line.command).entered();

        let source = line.origin.clone().unwrap_or_else(|| peer_name.clone());
        if state == LinkState::Connected && line.origin.is_some() {
            let direction = self.source_server(&source);
            if self.topology.best_route_to(&direction) != Some(conn) {
                debug!(conn = %conn, source = %source, command = %line.command, "Fake direction");
                return;
            }
            self.reset_ping(conn);
        }

        // Relayed lines always name their origin.
        let relay = match line.origin {
            Some(_) => raw.to_string(),
            None => format!(":{peer_name} {raw}"),
        };
        if line.command == "SVSMODE" {
            line.command = "MODE".into();
        }

        let ctx = Context {
            conn,
            peer: &peer_name,
            source: &source,
            raw: &relay,
        };
        let handler = self.dispatch.lookup(state, &line.command);
        if let Err(error) = handler(self, &ctx, &line) {
            self.close_link(conn, error);
        }
    }

    /// Any traffic from a direct peer counts as proof of life.
    fn reset_ping(&mut self, conn: ConnId) {
        let due = self.now() + self.config.sync.ping_interval as i64;
        if let Some(node) = self.topology.peer_for_conn(conn)
            && let Some(node) = self.topology.get_mut(node)
        {
            node.ping_due = due;
            node.ping_answered = true;
            node.missed_pings = 0;
        }
    }
}
