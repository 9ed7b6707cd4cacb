//! The link-layer context object.
//!
//! One `SyncManager` exists per process. It owns the topology, the link
//! registry, every peer connection and the entity store, and is driven
//! entirely by the network event loop: accepted sockets, connect results,
//! received lines, closures and a once-per-second tick. Its only output is
//! the queue of [`Action`]s the network layer drains after each call.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use tracing::{debug, info, warn};

use crate::clock::NetClock;
use crate::config::{Config, LinkBlock};
use crate::error::LinkError;
use crate::handlers::Registry;
use crate::store::{EntityStore, User};

use super::capab;
use super::extension::SyncExtension;
use super::link::{Action, ConnId, Direction, LinkState, PeerConnection};
use super::registry::LinkRegistry;
use super::topology::Topology;

/// Inbound sockets get this long to authenticate.
pub(crate) const INBOUND_HANDSHAKE_TIMEOUT: i64 = 60;

pub struct SyncManager<S: EntityStore> {
    pub(crate) config: Config,
    pub(crate) topology: Topology,
    pub(crate) registry: LinkRegistry,
    pub(crate) conns: BTreeMap<ConnId, PeerConnection>,
    next_conn: u64,
    pub(crate) store: S,
    pub(crate) clock: NetClock,
    outbox: Vec<Action>,
    pub(crate) extensions: Vec<Box<dyn SyncExtension>>,
    pub(crate) next_timesync: i64,
    pub(crate) dispatch: Registry<S>,
}

impl<S: EntityStore> SyncManager<S> {
    pub fn new(config: Config, store: S, clock: NetClock) -> Self {
        let now = clock.now();
        let topology = Topology::new(
            &config.server.name,
            &config.server.description,
            &config.server.version,
        );
        let registry = LinkRegistry::new(config.links.clone(), now);
        let next_timesync = now + config.sync.timesync_interval as i64;
        Self {
            config,
            topology,
            registry,
            conns: BTreeMap::new(),
            next_conn: 1,
            store,
            clock,
            outbox: Vec::new(),
            extensions: Vec::new(),
            next_timesync,
            dispatch: Registry::new(),
        }
    }

    // ---- accessors ---------------------------------------------------------

    /// Our server name.
    pub fn server_name(&self) -> &str {
        &self.config.server.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn registry(&self) -> &LinkRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn clock(&self) -> &NetClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut NetClock {
        &mut self.clock
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    pub fn connection(&self, conn: ConnId) -> Option<&PeerConnection> {
        self.conns.get(&conn)
    }

    pub fn connections(&self) -> impl Iterator<Item = &PeerConnection> {
        self.conns.values()
    }

    /// Register a metadata extension.
    pub fn register_extension(&mut self, extension: Box<dyn SyncExtension>) {
        info!(extension = extension.name(), "sync extension registered");
        self.extensions.push(extension);
    }

    /// Drain the side effects produced since the last call.
    pub fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.outbox)
    }

    // ---- output ------------------------------------------------------------

    pub(crate) fn send(&mut self, conn: ConnId, line: impl Into<String>) {
        let line = line.into();
        debug!(conn = %conn, line = %line, "send");
        self.outbox.push(Action::Send { conn, line });
    }

    pub(crate) fn push_action(&mut self, action: Action) {
        self.outbox.push(action);
    }

    /// Link notice, mirrored to the log.
    pub(crate) fn link_notice(&mut self, text: &str) {
        self.store.server_notice('l', text);
    }

    fn allocate(&mut self) -> ConnId {
        let id = ConnId(self.next_conn);
        self.next_conn += 1;
        id
    }

    // ---- connection lifecycle ---------------------------------------------

    /// Record a listening socket. It only ever accepts.
    pub fn register_listener(&mut self, addr: SocketAddr) -> ConnId {
        let id = self.allocate();
        let mut conn = PeerConnection::new(id, LinkState::Listener, Direction::Inbound);
        conn.addr = Some(addr);
        self.conns.insert(id, conn);
        info!(conn = %id, addr = %addr, "listening for server links");
        id
    }

    /// A transport accepted by a listener has finished any transport hook.
    /// Returns `None` when no link block admits the peer's address.
    pub fn accept(&mut self, addr: SocketAddr) -> Option<ConnId> {
        if !self.registry.allows_ip(addr.ip()) {
            self.link_notice(&format!(
                "Server connection from {} denied (no link blocks with that IP address)",
                addr.ip()
            ));
            return None;
        }
        let id = self.allocate();
        let mut conn = PeerConnection::new(id, LinkState::WaitAuth1, Direction::Inbound);
        conn.addr = Some(addr);
        conn.deadline = Some(self.now() + INBOUND_HANDSHAKE_TIMEOUT);
        self.conns.insert(id, conn);
        info!(conn = %id, addr = %addr, "inbound server connection");
        for line in capab::capab_lines(&self.config) {
            self.send(id, line);
        }
        Some(id)
    }

    /// Begin an outbound attempt to a configured link by name.
    pub fn connect(&mut self, name: &str) -> Result<ConnId, String> {
        let Some(block) = self.registry.find(name).cloned() else {
            return Err(format!("No link block named {name}"));
        };
        Ok(self.connect_block(block))
    }

    pub(crate) fn connect_block(&mut self, block: LinkBlock) -> ConnId {
        let id = self.allocate();
        let mut conn = PeerConnection::new(id, LinkState::Connecting, Direction::Outbound);
        conn.deadline = Some(self.now() + block.timeout as i64);
        conn.link = Some(block.clone());
        self.conns.insert(id, conn);
        info!(conn = %id, peer = %block.name, host = %block.hostname, port = block.port, "connecting");
        self.push_action(Action::Connect {
            conn: id,
            link: Box::new(block),
        });
        id
    }

    /// The transport for an outbound attempt is up: introduce ourselves.
    pub fn transport_ready(&mut self, conn: ConnId, addr: Option<SocketAddr>) {
        let Some(peer) = self.conns.get_mut(&conn) else {
            return;
        };
        peer.addr = addr;
        let Some(block) = peer.link.clone() else {
            return;
        };
        for line in capab::capab_lines(&self.config) {
            self.send(conn, line);
        }
        let intro = format!(
            "SERVER {} {} 0 :{}",
            self.config.server.name, block.send_password, self.config.server.description
        );
        self.send(conn, intro);
    }

    /// An outbound attempt failed before the transport came up.
    pub fn connect_failed(&mut self, conn: ConnId, reason: &str) {
        let Some(peer) = self.conns.remove(&conn) else {
            return;
        };
        let name = peer.label();
        warn!(conn = %conn, peer = %name, reason = %reason, "outbound connection failed");
        self.link_notice(&format!("CONNECT: Error connecting {name}: {reason}"));
        self.failover(&name);
    }

    /// The transport closed underneath us.
    pub fn closed(&mut self, conn: ConnId, reason: &str) {
        let Some(peer) = self.conns.get(&conn) else {
            return;
        };
        debug!(conn = %conn, reason = %reason, "transport closed");
        if peer.state == LinkState::Connected {
            let name = peer.label();
            self.link_notice(&format!("Connection to '{name}' failed."));
        }
        self.drop_connection(conn, "Remote host closed the connection");
    }

    /// Send `ERROR` (when one is owed), close, and tear down.
    pub(crate) fn close_link(&mut self, conn: ConnId, error: LinkError) {
        if !self.conns.contains_key(&conn) {
            return;
        }
        if let Some(line) = error.error_line() {
            self.send(conn, line);
        }
        let reason = error.to_string();
        warn!(conn = %conn, reason = %reason, "closing link");
        self.drop_connection(conn, &reason);
    }

    /// Forget a connection, splitting whatever it carried and failing over
    /// when an outbound attempt never completed.
    pub(crate) fn drop_connection(&mut self, conn: ConnId, reason: &str) {
        self.push_action(Action::Close { conn });
        if let Some(node) = self.topology.peer_for_conn(conn) {
            self.squit(node, reason);
        }
        let Some(peer) = self.conns.remove(&conn) else {
            return;
        };
        if peer.direction == Direction::Outbound && peer.state != LinkState::Connected {
            let name = peer.label();
            self.link_notice(&format!("CONNECT: Error connecting {name}: {reason}"));
            self.failover(&name);
        }
    }

    /// Try the failover target configured for `name`, if any.
    pub(crate) fn failover(&mut self, name: &str) {
        let Some(target) = self.registry.failover_for(name).cloned() else {
            return;
        };
        if self.topology.find_by_name(&target.name).is_some() || self.pending_for(&target.name) {
            return;
        }
        self.link_notice(&format!(
            "FAILOVER: Trying failover link for {name}: {}...",
            target.name
        ));
        self.connect_block(target);
    }

    /// Whether an outbound attempt for `name` is already underway.
    pub(crate) fn pending_for(&self, name: &str) -> bool {
        self.conns.values().any(|c| {
            c.state != LinkState::Connected
                && c.link
                    .as_ref()
                    .is_some_and(|l| slirc_wire::casemap::irc_eq(&l.name, name))
        })
    }

    /// Replace the configuration. Established links stay up; pending
    /// attempts to links that no longer exist are abandoned.
    pub fn reload(&mut self, config: Config) {
        let now = self.now();
        self.registry.reload(config.links.clone(), now);
        let abandoned: Vec<ConnId> = self
            .conns
            .values()
            .filter(|c| c.state == LinkState::Connecting)
            .filter(|c| c.link.as_ref().is_some_and(|l| self.registry.find(&l.name).is_none()))
            .map(|c| c.id)
            .collect();
        for conn in abandoned {
            self.conns.remove(&conn);
            self.push_action(Action::Close { conn });
        }
        self.config = config;
        info!(links = self.registry.blocks().count(), "link configuration reloaded");
    }

    pub(crate) fn peer_name(&self, conn: ConnId) -> String {
        self.conns.get(&conn).map(PeerConnection::label).unwrap_or_default()
    }

    // ---- user bookkeeping --------------------------------------------------

    /// Add a user to the store and to its server's count.
    pub(crate) fn add_user(&mut self, user: User) {
        self.count_user(&user.server.clone(), 1);
        self.store.add_user(user);
    }

    /// Remove a user from the store and from its server's count.
    pub(crate) fn quit_user(&mut self, nick: &str, reason: &str) -> Option<User> {
        let user = self.store.remove_user(nick, reason)?;
        self.count_user(&user.server, -1);
        Some(user)
    }

    /// Whether `nick` is attached to this server.
    pub(crate) fn is_local_user(&self, nick: &str) -> bool {
        self.store
            .user(nick)
            .is_some_and(|u| slirc_wire::casemap::irc_eq(&u.server, &self.config.server.name))
    }

    pub(crate) fn count_user(&mut self, server: &str, delta: isize) {
        if let Some(node) = self.topology.find_by_name(server)
            && let Some(node) = self.topology.get_mut(node)
        {
            node.user_count = node.user_count.saturating_add_signed(delta);
        }
    }
}
