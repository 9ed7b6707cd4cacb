//! Netsplit handling.
//!
//! When a server leaves the tree, this module handles the cleanup:
//! - Announces the SQUIT to every other peer
//! - Removes the subtree, children before parents
//! - Quits every user attached to a removed server
//! - Reports the damage to operators

use tracing::{debug, info};

use crate::store::EntityStore;

use super::manager::SyncManager;
use super::topology::NodeId;

/// What a split cost us.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitReport {
    pub servers: usize,
    pub users: usize,
}

impl<S: EntityStore> SyncManager<S> {
    /// Remove `node` and everything behind it from the network.
    ///
    /// Users on the lost servers quit with `"<parent> <server>"` as the reason,
    /// the traditional netsplit form. The root cannot be split.
    pub(crate) fn squit(&mut self, node: NodeId, reason: &str) -> SplitReport {
        let Some(target) = self.topology.get(node) else {
            debug!("squit for unknown server");
            return SplitReport::default();
        };
        let Some(parent_id) = target.parent() else {
            debug!("refusing to squit the local server");
            return SplitReport::default();
        };
        let name = target.name.clone();
        let route = target.conn;
        let parent = self
            .topology
            .get(parent_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();

        for extension in &mut self.extensions {
            extension.on_lost_server(&name);
        }

        self.to_all_but(route, &format!(":{parent} SQUIT {name} :{reason}"));
        if parent_id == self.topology.root() {
            self.store.oper_notice(&format!("Server {name} split: {reason}"));
        } else {
            self.store
                .oper_notice(&format!("Server {name} split from server {parent} with reason: {reason}"));
        }

        let quit_reason = format!("{parent} {name}");
        let removed = self.topology.remove_subtree(node);
        let mut report = SplitReport {
            servers: removed.len(),
            users: 0,
        };
        for server in &removed {
            for nick in self.store.users_on(&server.name) {
                if self.store.remove_user(&nick, &quit_reason).is_some() {
                    report.users += 1;
                }
            }
        }

        info!(
            server = %name,
            reason = %reason,
            servers = report.servers,
            users = report.users,
            "netsplit"
        );
        self.store.oper_notice(&format!(
            "Netsplit complete, lost {} users on {} servers.",
            report.users, report.servers
        ));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::NetClock;
    use crate::config::Config;
    use crate::store::{MemberStatus, MemoryStore, User};
    use crate::sync::{Action, ConnId};

    fn manager() -> SyncManager<MemoryStore> {
        let config = Config::parse(
            r#"
            [server]
            name = "hub.example.net"
            description = "Hub"
            "#,
        )
        .unwrap();
        SyncManager::new(config, MemoryStore::new("hub.example.net"), NetClock::frozen(1_000))
    }

    fn user(nick: &str, server: &str) -> User {
        User {
            nick: nick.into(),
            ident: "u".into(),
            host: "h".into(),
            dhost: "h".into(),
            ip: "192.0.2.1".into(),
            gecos: "g".into(),
            age: 1,
            signon: 1,
            idle_since: 1,
            server: server.into(),
            modes: Default::default(),
            oper_type: None,
            away: None,
            metadata: Default::default(),
        }
    }

    #[test]
    fn split_removes_subtree_users_and_announces() {
        let mut sm = manager();
        let root = sm.topology.root();
        let a = sm.topology.add_child(root, "leaf-a", "", ConnId(1)).unwrap();
        sm.topology.add_child(a, "deep", "", ConnId(1)).unwrap();
        sm.topology.add_child(root, "leaf-b", "", ConnId(2)).unwrap();
        sm.add_user(user("alice", "leaf-a"));
        sm.add_user(user("bob", "deep"));
        sm.add_user(user("carol", "leaf-b"));
        sm.store
            .create_channel("#rust", 5)
            .add_member("bob", MemberStatus::default());

        let report = sm.squit(a, "Ping timeout");
        assert_eq!(report, SplitReport { servers: 2, users: 2 });
        assert!(sm.store.user("alice").is_none());
        assert!(sm.store.user("bob").is_none());
        assert!(sm.store.user("carol").is_some());
        assert!(sm.store.channel("#rust").is_none());
        assert!(sm.topology.find_by_name("deep").is_none());
        sm.topology.check_invariants().unwrap();

        let sent: Vec<_> = sm
            .take_actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Send { conn, line } => Some((conn, line)),
                _ => None,
            })
            .collect();
        assert_eq!(
            sent,
            vec![(ConnId(2), ":hub.example.net SQUIT leaf-a :Ping timeout".to_string())]
        );
        assert!(
            sm.store
                .notices()
                .any(|(_, text)| text == "Netsplit complete, lost 2 users on 2 servers.")
        );
    }

    #[test]
    fn root_cannot_be_split() {
        let mut sm = manager();
        let root = sm.topology.root();
        assert_eq!(sm.squit(root, "no"), SplitReport::default());
        assert_eq!(sm.topology.len(), 1);
    }
}
