//! Fixtures shared by unit tests.

use crate::clock::NetClock;
use crate::config::Config;
use crate::store::{MemoryStore, User};
use crate::sync::{Action, ConnId, Direction, LinkState, PeerConnection, SyncManager};

pub(crate) const HUB: &str = "hub.example.net";
pub(crate) const NOW: i64 = 1_000_000;

pub(crate) fn config(extra: &str) -> Config {
    Config::parse(&format!(
        r#"
        [server]
        name = "{HUB}"
        description = "Hub"
        version = "slircd-link-test"
        {extra}
        "#
    ))
    .unwrap()
}

pub(crate) fn manager_with(extra: &str) -> SyncManager<MemoryStore> {
    SyncManager::new(config(extra), MemoryStore::new(HUB), NetClock::frozen(NOW))
}

pub(crate) fn manager() -> SyncManager<MemoryStore> {
    manager_with("")
}

pub(crate) fn user(nick: &str, server: &str) -> User {
    User {
        nick: nick.into(),
        ident: "u".into(),
        host: "host.example".into(),
        dhost: "host.example".into(),
        ip: "192.0.2.1".into(),
        gecos: "Real Name".into(),
        age: 500,
        signon: 500,
        idle_since: 500,
        server: server.into(),
        modes: Default::default(),
        oper_type: None,
        away: None,
        metadata: Default::default(),
    }
}

/// Attach `name` as a CONNECTED direct peer on `conn`, burst finished.
pub(crate) fn link(sm: &mut SyncManager<MemoryStore>, name: &str, conn: u64) -> ConnId {
    let id = ConnId(conn);
    let mut peer = PeerConnection::new(id, LinkState::Connected, Direction::Inbound);
    peer.remote_name = Some(name.into());
    sm.conns.insert(id, peer);
    let root = sm.topology.root();
    sm.topology.add_child(root, name, "", id).unwrap();
    id
}

/// Attach `name` behind an existing server.
pub(crate) fn remote(sm: &mut SyncManager<MemoryStore>, parent: &str, name: &str) {
    let parent = sm.topology.find_by_name(parent).unwrap();
    let conn = sm.topology.get(parent).unwrap().conn.unwrap();
    sm.topology.add_child(parent, name, "", conn).unwrap();
}

/// Lines queued for sending since the last call.
pub(crate) fn sent(sm: &mut SyncManager<MemoryStore>) -> Vec<(ConnId, String)> {
    sm.take_actions()
        .into_iter()
        .filter_map(|a| match a {
            Action::Send { conn, line } => Some((conn, line)),
            _ => None,
        })
        .collect()
}

/// Lines queued for one connection.
pub(crate) fn sent_to(all: &[(ConnId, String)], conn: ConnId) -> Vec<&str> {
    all.iter()
        .filter(|(c, _)| *c == conn)
        .map(|(_, l)| l.as_str())
        .collect()
}

pub(crate) fn has_notice(sm: &SyncManager<MemoryStore>, text: &str) -> bool {
    sm.store().notices().any(|(_, n)| n == text)
}
