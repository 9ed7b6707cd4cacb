//! Configured link blocks and their autoconnect timers.

use std::net::IpAddr;

use slirc_wire::casemap::irc_eq;
use slirc_wire::wildcard_match;
use subtle::ConstantTimeEq;

use crate::config::LinkBlock;

#[derive(Debug, Clone)]
struct LinkEntry {
    block: LinkBlock,
    /// Next autoconnect attempt. Meaningless when autoconnect is 0.
    next_connect: i64,
}

/// The set of servers we may link with.
#[derive(Debug, Clone, Default)]
pub struct LinkRegistry {
    entries: Vec<LinkEntry>,
}

impl LinkRegistry {
    pub fn new(blocks: Vec<LinkBlock>, now: i64) -> Self {
        let mut registry = Self::default();
        registry.reload(blocks, now);
        registry
    }

    /// Replace the link list. Autoconnect timers survive for links that
    /// keep their name.
    pub fn reload(&mut self, blocks: Vec<LinkBlock>, now: i64) {
        let previous = std::mem::take(&mut self.entries);
        self.entries = blocks
            .into_iter()
            .map(|block| {
                let next_connect = previous
                    .iter()
                    .find(|e| irc_eq(&e.block.name, &block.name))
                    .map(|e| e.next_connect)
                    .unwrap_or(now + block.autoconnect as i64);
                LinkEntry {
                    block,
                    next_connect,
                }
            })
            .collect();
    }

    pub fn blocks(&self) -> impl Iterator<Item = &LinkBlock> {
        self.entries.iter().map(|e| &e.block)
    }

    pub fn find(&self, name: &str) -> Option<&LinkBlock> {
        self.blocks().find(|b| irc_eq(&b.name, name))
    }

    /// Exact name first, then the first glob match in configuration order.
    pub fn find_by_mask(&self, mask: &str) -> Option<&LinkBlock> {
        self.find(mask)
            .or_else(|| self.blocks().find(|b| wildcard_match(mask, &b.name)))
    }

    /// Link block whose name and receive password both match.
    pub fn authenticate(&self, name: &str, password: &str) -> Option<&LinkBlock> {
        self.blocks().find(|b| {
            irc_eq(&b.name, name) && bool::from(b.recv_password.as_bytes().ct_eq(password.as_bytes()))
        })
    }

    /// Whether any link block admits connections from `ip`.
    pub fn allows_ip(&self, ip: IpAddr) -> bool {
        self.blocks().any(|b| b.allows(ip))
    }

    /// Link blocks whose autoconnect timer has fired, rescheduling each.
    pub fn due_autoconnects(&mut self, now: i64) -> Vec<LinkBlock> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            if entry.block.autoconnect == 0 || entry.next_connect > now {
                continue;
            }
            entry.next_connect = now + entry.block.autoconnect as i64;
            due.push(entry.block.clone());
        }
        due
    }

    /// The link to try when `name` fails.
    pub fn failover_for(&self, name: &str) -> Option<&LinkBlock> {
        self.find(name)
            .and_then(|b| b.failover.as_deref())
            .and_then(|target| self.find(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn blocks() -> Vec<LinkBlock> {
        Config::parse(
            r#"
            [server]
            name = "hub.example.net"
            description = "Hub"

            [[link]]
            name = "leaf.example.net"
            hostname = "192.0.2.10"
            port = 7000
            send_password = "out"
            recv_password = "in"
            autoconnect = 60
            failover = "backup.example.net"

            [[link]]
            name = "backup.example.net"
            hostname = "backup.example.net"
            port = 7000
            send_password = "out2"
            recv_password = "in2"
            allow_mask = "198.51.100.0/24"
            "#,
        )
        .unwrap()
        .links
    }

    #[test]
    fn authenticate_checks_name_and_password() {
        let registry = LinkRegistry::new(blocks(), 0);
        assert!(registry.authenticate("LEAF.example.net", "in").is_some());
        assert!(registry.authenticate("leaf.example.net", "out").is_none());
        assert!(registry.authenticate("other.example.net", "in").is_none());
    }

    #[test]
    fn allowlist_uses_literal_hosts_and_masks() {
        let registry = LinkRegistry::new(blocks(), 0);
        assert!(registry.allows_ip("192.0.2.10".parse().unwrap()));
        assert!(registry.allows_ip("198.51.100.77".parse().unwrap()));
        assert!(!registry.allows_ip("203.0.113.1".parse().unwrap()));
    }

    #[test]
    fn autoconnect_fires_and_reschedules() {
        let mut registry = LinkRegistry::new(blocks(), 1_000);
        assert!(registry.due_autoconnects(1_059).is_empty());
        let due = registry.due_autoconnects(1_060);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].name, "leaf.example.net");
        assert!(registry.due_autoconnects(1_100).is_empty());
        assert_eq!(registry.due_autoconnects(1_120).len(), 1);
    }

    #[test]
    fn reload_keeps_timers_for_surviving_links() {
        let mut registry = LinkRegistry::new(blocks(), 1_000);
        registry.reload(blocks(), 5_000);
        assert_eq!(registry.due_autoconnects(1_060).len(), 1);
    }

    #[test]
    fn failover_and_mask_lookup() {
        let registry = LinkRegistry::new(blocks(), 0);
        assert_eq!(
            registry.failover_for("leaf.example.net").map(|b| b.name.as_str()),
            Some("backup.example.net")
        );
        assert!(registry.failover_for("backup.example.net").is_none());
        assert_eq!(
            registry.find_by_mask("back*").map(|b| b.name.as_str()),
            Some("backup.example.net")
        );
    }
}
