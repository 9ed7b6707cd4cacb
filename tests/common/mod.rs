//! In-process network of link managers for integration tests.
//!
//! Every node is a [`SyncManager`] over a [`MemoryStore`] with a frozen
//! clock. "Sockets" are entries in a wire table and [`Net::pump`] moves
//! queued lines between them until the network is quiet, so a whole
//! handshake and burst plays out deterministically without touching TCP.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use slircd_link::config::Config;
use slircd_link::store::{MemoryStore, User};
use slircd_link::sync::{Action, ConnId, LinkState, SyncManager};
use slircd_link::{EntityStore, NetClock};

pub const T: i64 = 1_700_000_000;
pub const PORT: u16 = 7000;
pub const PASSWORD: &str = "linkpass";

/// Loop guard for [`Net::pump`].
const MAX_ROUNDS: usize = 10_000;

pub struct Node {
    pub name: String,
    pub ip: IpAddr,
    pub sm: SyncManager<MemoryStore>,
}

pub struct Net {
    pub nodes: Vec<Node>,
    wires: HashMap<(usize, ConnId), (usize, ConnId)>,
    next_port: u16,
}

/// Address of the `index`th node.
pub fn ip(index: usize) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 0, 2, index as u8 + 10))
}

/// Config for `name` holding a link block for every server in `peers`.
/// `extra` is spliced in after the `[server]` table.
pub fn node_config(name: &str, peers: &[(&str, usize)], extra: &str) -> Config {
    let mut text = format!(
        r#"
        [server]
        name = "{name}"
        description = "{name} test server"
        version = "slircd-link-test"
        {extra}
        "#
    );
    for (peer, index) in peers {
        text.push_str(&format!(
            r#"
            [[link]]
            name = "{peer}"
            hostname = "{}"
            port = {PORT}
            send_password = "{PASSWORD}"
            recv_password = "{PASSWORD}"
            "#,
            ip(*index)
        ));
    }
    Config::parse(&text).expect("test config parses")
}

pub fn user(nick: &str) -> User {
    User {
        nick: nick.into(),
        ident: nick.into(),
        host: format!("{nick}.example.org"),
        dhost: format!("{nick}.example.org"),
        ip: "203.0.113.5".into(),
        gecos: format!("{nick} test user"),
        age: T - 100,
        signon: T - 100,
        idle_since: T - 100,
        server: String::new(),
        modes: Default::default(),
        oper_type: None,
        away: None,
        metadata: Default::default(),
    }
}

impl Net {
    /// Nodes named and clocked as given, each with a link block for every
    /// other node.
    pub fn new(specs: &[(&str, i64)]) -> Self {
        Self::with_extra(specs, |_| String::new())
    }

    /// Like [`Net::new`] with per-node config text.
    pub fn with_extra(specs: &[(&str, i64)], extra: impl Fn(usize) -> String) -> Self {
        let configs = specs
            .iter()
            .enumerate()
            .map(|(i, (name, _))| {
                let peers: Vec<(&str, usize)> = specs
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(j, (peer, _))| (*peer, j))
                    .collect();
                node_config(name, &peers, &extra(i))
            })
            .collect();
        Self::from_configs(configs, specs.iter().map(|(_, clock)| *clock).collect())
    }

    pub fn from_configs(configs: Vec<Config>, clocks: Vec<i64>) -> Self {
        let nodes = configs
            .into_iter()
            .zip(clocks)
            .enumerate()
            .map(|(i, (config, clock))| {
                let name = config.server.name.clone();
                let store = MemoryStore::new(&name);
                Node {
                    name,
                    ip: ip(i),
                    sm: SyncManager::new(config, store, NetClock::frozen(clock)),
                }
            })
            .collect();
        Self {
            nodes,
            wires: HashMap::new(),
            next_port: 40_000,
        }
    }

    pub fn sm(&mut self, index: usize) -> &mut SyncManager<MemoryStore> {
        &mut self.nodes[index].sm
    }

    /// Node `from` connects to node `to`; the network then settles.
    pub fn link(&mut self, from: usize, to: usize) {
        let name = self.nodes[to].name.clone();
        self.nodes[from]
            .sm
            .connect(&name)
            .expect("link block exists");
        self.pump();
    }

    /// Close the transport between two directly linked nodes.
    pub fn cut(&mut self, a: usize, b: usize) {
        let Some((&(_, conn), &(_, peer_conn))) = self
            .wires
            .iter()
            .find(|((i, _), (j, _))| *i == a && *j == b)
        else {
            panic!("{a} and {b} are not wired");
        };
        self.wires.remove(&(a, conn));
        self.wires.remove(&(b, peer_conn));
        self.nodes[a].sm.closed(conn, "Connection reset by peer");
        self.nodes[b].sm.closed(peer_conn, "Connection reset by peer");
        self.pump();
    }

    /// Advance every clock by `secs`.
    pub fn advance(&mut self, secs: i64) {
        for node in &mut self.nodes {
            node.sm.clock_mut().advance(secs);
        }
    }

    /// Run every node's timers once, then settle.
    pub fn tick(&mut self) {
        for node in &mut self.nodes {
            node.sm.tick();
        }
        self.pump();
    }

    /// Deliver queued actions until nothing is left to do.
    pub fn pump(&mut self) {
        for _ in 0..MAX_ROUNDS {
            let mut busy = false;
            for i in 0..self.nodes.len() {
                let actions = self.nodes[i].sm.take_actions();
                busy |= !actions.is_empty();
                for action in actions {
                    self.perform(i, action);
                }
            }
            if !busy {
                return;
            }
        }
        panic!("network did not settle");
    }

    fn perform(&mut self, from: usize, action: Action) {
        match action {
            Action::Send { conn, line } => {
                if let Some(&(to, peer_conn)) = self.wires.get(&(from, conn)) {
                    self.nodes[to].sm.handle_line(peer_conn, &line);
                }
            }
            Action::Close { conn } => {
                if let Some((to, peer_conn)) = self.wires.remove(&(from, conn)) {
                    self.wires.remove(&(to, peer_conn));
                    self.nodes[to].sm.closed(peer_conn, "Connection closed");
                }
            }
            Action::Connect { conn, link } => {
                let Some(to) = self.nodes.iter().position(|n| n.name == link.name) else {
                    self.nodes[from].sm.connect_failed(conn, "Host not found");
                    return;
                };
                self.next_port += 1;
                let source = SocketAddr::new(self.nodes[from].ip, self.next_port);
                match self.nodes[to].sm.accept(source) {
                    Some(peer_conn) => {
                        self.wires.insert((from, conn), (to, peer_conn));
                        self.wires.insert((to, peer_conn), (from, conn));
                        let dest = SocketAddr::new(self.nodes[to].ip, PORT);
                        self.nodes[from].sm.transport_ready(conn, Some(dest));
                    }
                    None => self.nodes[from].sm.connect_failed(conn, "Connection refused"),
                }
            }
            Action::Rehash => {}
        }
    }

    /// Whether `a` sees `b` in its server tree.
    pub fn knows(&self, a: usize, b: usize) -> bool {
        self.nodes[a].sm.topology().find_by_name(&self.nodes[b].name).is_some()
    }

    /// Connected links on node `index`.
    pub fn live_links(&self, index: usize) -> usize {
        self.nodes[index]
            .sm
            .connections()
            .filter(|c| c.state == LinkState::Connected)
            .count()
    }

    pub fn has_notice(&self, index: usize, text: &str) -> bool {
        self.nodes[index].sm.store().notices().any(|(_, n)| n == text)
    }

    /// Lines delivered to local users on node `index` that contain `needle`.
    pub fn delivered(&self, index: usize, needle: &str) -> Vec<String> {
        self.nodes[index]
            .sm
            .store()
            .deliveries()
            .filter(|d| d.line.contains(needle))
            .map(|d| format!("{} <- {}", d.target, d.line))
            .collect()
    }

    pub fn nicks(&self, index: usize) -> Vec<String> {
        let mut nicks: Vec<String> = self.nodes[index]
            .sm
            .store()
            .users()
            .into_iter()
            .map(|u| u.nick.clone())
            .collect();
        nicks.sort();
        nicks
    }
}
