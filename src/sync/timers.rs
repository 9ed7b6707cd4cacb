//! Periodic work driven by the once-per-second tick.

use tracing::{debug, info, warn};

use crate::error::LinkError;
use crate::store::EntityStore;

use super::link::{ConnId, LinkState};
use super::manager::SyncManager;

/// Consecutive unanswered pings that sever a link.
const MAX_MISSED_PINGS: u8 = 2;

impl<S: EntityStore> SyncManager<S> {
    /// Run everything that is due. Called once a second by the event loop.
    pub fn tick(&mut self) {
        self.autoconnect();
        self.expire_handshakes();
        self.check_pings();
        self.periodic_timesync();
    }

    fn autoconnect(&mut self) {
        let now = self.now();
        for block in self.registry.due_autoconnects(now) {
            if self.topology.find_by_name(&block.name).is_some() || self.pending_for(&block.name) {
                continue;
            }
            if let Some(failover) = &block.failover
                && self.topology.find_by_name(failover).is_some()
            {
                debug!(link = %block.name, failover = %failover, "failover target already linked");
                continue;
            }
            self.link_notice(&format!(
                "AUTOCONNECT: Auto-connecting server {} ({} seconds until timeout)",
                block.name, block.timeout
            ));
            self.connect_block(block);
        }
    }

    fn expire_handshakes(&mut self) {
        let now = self.now();
        let expired: Vec<ConnId> = self
            .conns
            .values()
            .filter(|c| c.state != LinkState::Connected && c.state != LinkState::Listener)
            .filter(|c| c.deadline.is_some_and(|d| d <= now))
            .map(|c| c.id)
            .collect();
        for conn in expired {
            info!(conn = %conn, peer = %self.peer_name(conn), "handshake timed out");
            self.drop_connection(conn, "Connection timed out");
        }
    }

    fn check_pings(&mut self) {
        let now = self.now();
        let interval = self.config.sync.ping_interval as i64;
        let us = self.config.server.name.clone();
        for node in self.topology.direct_peers() {
            let Some(server) = self.topology.get_mut(node) else {
                continue;
            };
            if server.ping_due > now {
                continue;
            }
            if server.ping_answered {
                server.missed_pings = 0;
            } else {
                server.missed_pings += 1;
            }
            let (name, conn, missed) = (server.name.clone(), server.conn, server.missed_pings);
            let Some(conn) = conn else {
                continue;
            };
            if missed >= MAX_MISSED_PINGS {
                warn!(peer = %name, "ping timeout");
                self.link_notice(&format!("Server {name} pinged out"));
                self.close_link(conn, LinkError::Protocol("Ping timeout".into()));
                continue;
            }
            if let Some(server) = self.topology.get_mut(node) {
                server.ping_answered = false;
                server.ping_due = now + interval;
            }
            self.send(conn, format!(":{us} PING {name}"));
        }
    }

    fn periodic_timesync(&mut self) {
        if !self.config.sync.time_sync || self.now() < self.next_timesync {
            return;
        }
        let now = self.now();
        self.next_timesync = now + self.config.sync.timesync_interval as i64;
        let force = if self.config.sync.time_master { " FORCE" } else { "" };
        let us = self.config.server.name.clone();
        self.to_all(&format!(":{us} TIMESET {now}{force}"));
    }
}
