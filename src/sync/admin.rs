//! Operator and client commands answered from link state.
//!
//! Every entry point takes the nick that asked. Replies go to that user as
//! numerics or notices; a remote asker gets them through `PUSH`.

use tracing::info;

use crate::handlers::server::query::{admin_lines, motd_lines};
use crate::handlers::server::time::time_string;
use crate::store::EntityStore;

use super::link::LinkState;
use super::manager::SyncManager;
use super::topology::NodeId;

impl<S: EntityStore> SyncManager<S> {
    fn notify(&mut self, nick: &str, text: &str) {
        let us = self.config.server.name.clone();
        self.send_numerics(nick, vec![format!("NOTICE {nick} :{text}")]);
        info!(nick = %nick, server = %us, "{}", text);
    }

    /// Whether `node` should be shown to a user.
    fn visible(&self, node: NodeId, is_oper: bool) -> bool {
        if is_oper {
            return true;
        }
        let Some(server) = self.topology.get(node) else {
            return false;
        };
        if self.config.sync.hide_ulines && self.config.sync.is_trusted(&server.name) {
            return false;
        }
        !self.registry.find(&server.name).is_some_and(|b| b.hidden)
    }

    // ---- topology views ----------------------------------------------------

    /// `MAP`: the tree, indented by depth, with user counts.
    pub fn map(&mut self, nick: &str, is_oper: bool) {
        let total = self.topology.user_total().max(1);
        let mut lines = Vec::new();
        for (id, depth) in self.topology.walk() {
            if !self.visible(id, is_oper) {
                continue;
            }
            let Some(server) = self.topology.get(id) else {
                continue;
            };
            let percent = server.user_count as f64 * 100.0 / total as f64;
            let indent = "  ".repeat(depth);
            lines.push(format!(
                "006 {nick} :{indent}{} ({}) [{percent:.2}%]",
                server.name, server.user_count
            ));
        }
        lines.push(format!("007 {nick} :End of /MAP"));
        self.send_numerics(nick, lines);
    }

    /// `LINKS [mask]`
    pub fn links(&mut self, nick: &str, mask: Option<&str>, is_oper: bool) {
        let mask = mask.unwrap_or("*");
        let us = self.config.server.name.clone();
        let flat = self.config.sync.flat_links && !is_oper;
        let mut lines = Vec::new();
        for (id, depth) in self.topology.walk() {
            if !self.visible(id, is_oper) {
                continue;
            }
            let Some(server) = self.topology.get(id) else {
                continue;
            };
            if !slirc_wire::wildcard_match(mask, &server.name) {
                continue;
            }
            let parent = match server.parent().and_then(|p| self.topology.get(p)) {
                Some(_) if flat => us.clone(),
                Some(parent) => parent.name.clone(),
                None => server.name.clone(),
            };
            let hops = if flat { depth.min(1) } else { depth };
            lines.push(format!(
                "364 {nick} {} {parent} :{hops} {}",
                server.name, server.description
            ));
        }
        lines.push(format!("365 {nick} {mask} :End of /LINKS list."));
        self.send_numerics(nick, lines);
    }

    /// `LUSERS`: network-wide counts.
    pub fn lusers(&mut self, nick: &str) {
        let users = self.store.users();
        let total = users.len();
        let invisible = users.iter().filter(|u| u.modes.contains(&'i')).count();
        let opers = users.iter().filter(|u| u.modes.contains(&'o')).count();
        let local = users
            .iter()
            .filter(|u| slirc_wire::casemap::irc_eq(&u.server, &self.config.server.name))
            .count();
        let channels = self.store.channels().len();
        let servers = self.topology.len();
        let peers = self.topology.direct_peers().len();
        let lines = vec![
            format!(
                "251 {nick} :There are {} users and {invisible} invisible on {servers} servers",
                total - invisible
            ),
            format!("252 {nick} {opers} :operator(s) online"),
            format!("254 {nick} {channels} :channels formed"),
            format!("255 {nick} :I have {local} clients and {peers} servers"),
        ];
        self.send_numerics(nick, lines);
    }

    /// Numerics for `STATS <letter>`, ending with `219`.
    pub(crate) fn stats_lines(&self, nick: &str, letter: char) -> Vec<String> {
        let mut lines = Vec::new();
        match letter {
            'c' | 'n' => {
                let kind = letter.to_ascii_uppercase();
                for block in self.registry.blocks() {
                    let transport = if block.uses_tls() { "tls" } else { "plain" };
                    lines.push(format!(
                        "213 {nick} {kind} *@{} * {} {} {transport}",
                        block.hostname, block.name, block.port
                    ));
                }
            }
            'm' => {
                for (command, count) in self.dispatch.command_counts() {
                    lines.push(format!("212 {nick} {command} {count}"));
                }
            }
            'l' => {
                for peer in self.conns.values().filter(|c| c.state != LinkState::Listener) {
                    lines.push(format!(
                        "211 {nick} {} {:?} {}",
                        peer.label(),
                        peer.state,
                        peer.addr.map(|a| a.to_string()).unwrap_or_else(|| "*".into())
                    ));
                }
            }
            _ => {}
        }
        lines.push(format!("219 {nick} {letter} :End of /STATS report"));
        lines
    }

    // ---- link control ------------------------------------------------------

    /// `CONNECT <mask>`
    pub fn connect_command(&mut self, nick: &str, mask: &str) {
        let Some(block) = self.registry.find_by_mask(mask).cloned() else {
            self.notify(
                nick,
                &format!("*** CONNECT: No server matching {mask} could be found in the config file."),
            );
            return;
        };
        if let Some(node) = self.topology.find_by_name(&block.name) {
            let via = self
                .topology
                .get(node)
                .and_then(|n| n.conn)
                .map(|c| self.peer_name(c))
                .unwrap_or_default();
            self.notify(
                nick,
                &format!(
                    "*** CONNECT: Server {} already exists on the network and is connected via {via}",
                    block.name
                ),
            );
            return;
        }
        self.notify(
            nick,
            &format!(
                "*** CONNECT: Connecting to server: {} ({}:{})",
                block.name, block.hostname, block.port
            ),
        );
        self.connect_block(block);
    }

    /// `SQUIT <mask> [:reason]` from an operator. A direct peer is dropped
    /// here; anything further away is asked to drop it with `RSQUIT`.
    pub fn squit_command(&mut self, nick: &str, mask: &str, reason: &str) {
        let Some(node) = self.topology.find_by_mask(mask) else {
            self.notify(nick, &format!("*** SQUIT: The server {mask} does not exist on the network."));
            return;
        };
        if node == self.topology.root() {
            self.notify(
                nick,
                &format!(
                    "*** SQUIT: Foolish mortal, you cannot make a server SQUIT itself! ({mask} matches local server name)"
                ),
            );
            return;
        }
        let Some((name, conn)) = self.topology.get(node).map(|n| (n.name.clone(), n.conn)) else {
            return;
        };
        match conn {
            Some(conn) if self.topology.peer_for_conn(conn) == Some(node) => {
                let who = self
                    .store
                    .user(nick)
                    .map(|u| format!("{}!{}@{}", u.nick, u.ident, u.host))
                    .unwrap_or_else(|| nick.to_string());
                self.drop_connection(conn, &format!("Server quit by {who}"));
            }
            _ => {
                self.to_server(&name, &format!(":{nick} RSQUIT {name} :{reason}"));
            }
        }
    }

    // ---- remote queries ----------------------------------------------------

    /// Resolve a query mask. `Ok(None)` means us; unknown masks answer `402`.
    fn query_target(&mut self, nick: &str, mask: &str) -> Result<Option<String>, ()> {
        match self.topology.find_by_mask(mask) {
            Some(node) if node == self.topology.root() => Ok(None),
            Some(node) => Ok(self.topology.get(node).map(|n| n.name.clone())),
            None => {
                self.send_numerics(nick, vec![format!("402 {nick} {mask} :No such server")]);
                Err(())
            }
        }
    }

    /// `MOTD <server>`
    pub fn remote_motd(&mut self, nick: &str, mask: &str) {
        match self.query_target(nick, mask) {
            Ok(None) => {
                let lines = motd_lines(self, nick);
                self.send_numerics(nick, lines);
            }
            Ok(Some(server)) => {
                self.to_server(&server, &format!(":{nick} MOTD {server}"));
            }
            Err(()) => {}
        }
    }

    /// `ADMIN <server>`
    pub fn remote_admin(&mut self, nick: &str, mask: &str) {
        match self.query_target(nick, mask) {
            Ok(None) => {
                let lines = admin_lines(self, nick);
                self.send_numerics(nick, lines);
            }
            Ok(Some(server)) => {
                self.to_server(&server, &format!(":{nick} ADMIN {server}"));
            }
            Err(()) => {}
        }
    }

    /// `STATS <letter> <server>`
    pub fn remote_stats(&mut self, nick: &str, letter: char, mask: &str) {
        match self.query_target(nick, mask) {
            Ok(None) => {
                let lines = self.stats_lines(nick, letter);
                self.send_numerics(nick, lines);
            }
            Ok(Some(server)) => {
                self.to_server(&server, &format!(":{nick} STATS {letter} {server}"));
            }
            Err(()) => {}
        }
    }

    /// `TIME <server>`
    pub fn remote_time(&mut self, nick: &str, mask: &str) {
        let us = self.config.server.name.clone();
        match self.query_target(nick, mask) {
            Ok(None) => {
                let text = time_string(self.now());
                self.send_numerics(nick, vec![format!("391 {nick} {us} :{text}")]);
            }
            Ok(Some(server)) => {
                self.to_server(&server, &format!(":{us} TIME {server} {nick}"));
            }
            Err(()) => {}
        }
    }

    /// `VERSION <server>`, answered from the version each server announced.
    pub fn remote_version(&mut self, nick: &str, mask: &str) {
        let node = match self.query_target(nick, mask) {
            Ok(None) => Some(self.topology.root()),
            Ok(Some(server)) => self.topology.find_by_name(&server),
            Err(()) => return,
        };
        let Some(server) = node.and_then(|n| self.topology.get(n)) else {
            return;
        };
        let line = format!("351 {nick} {} :{}", server.name, server.version);
        self.send_numerics(nick, vec![line]);
    }

    /// `WHOIS <server> <nick>`: ask the target's server for idle time.
    pub fn remote_whois(&mut self, nick: &str, target: &str) {
        match self.store.user(target) {
            Some(user) if !slirc_wire::casemap::irc_eq(&user.server, &self.config.server.name) => {
                let target = user.nick.clone();
                self.to_user(&target, &format!(":{nick} IDLE {target}"));
            }
            Some(_) => {}
            None => {
                self.send_numerics(nick, vec![format!("401 {nick} {target} :No such nick/channel")]);
            }
        }
    }
}
