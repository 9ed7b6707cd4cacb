//! Netburst generation.
//!
//! When a link reaches CONNECTED we send the peer everything we know, in an
//! order where each stage only refers to things already sent:
//! - `BURST` with our clock
//! - the server tree, one `SERVER` and `VERSION` per node
//! - every user, with oper and away state
//! - every channel: members, modes, list modes, topic
//! - global bans and network metadata
//! - `ENDBURST`

use tracing::info;

use crate::store::modes::{ModeChange, stack_modes};
use crate::store::{Channel, EntityStore};

use super::link::ConnId;
use super::manager::SyncManager;

/// Room kept for the prefix and trailing nick on a batched `FJOIN`.
const FJOIN_LINE_BUDGET: usize = 480;

impl<S: EntityStore> SyncManager<S> {
    /// Send our full state to the newly linked peer on `conn`.
    pub(crate) fn send_burst(&mut self, conn: ConnId) {
        let name = self.peer_name(conn);
        let us = self.config.server.name.clone();
        self.link_notice(&format!("Bursting to {name}."));

        let force = if self.config.sync.time_master { " FORCE" } else { "" };
        self.send(conn, format!(":{us} BURST {}{force}", self.now()));
        self.send(conn, format!(":{us} VERSION :{}", self.config.server.version));

        let mut lines = self.burst_servers(conn);
        lines.extend(self.burst_users(conn));
        let channels: Vec<String> = self.store.channels().iter().map(|c| c.name.clone()).collect();
        for chan in channels {
            if let Some(channel) = self.store.channel(&chan) {
                lines.extend(self.burst_channel(channel));
            }
        }
        lines.extend(self.burst_network());
        let count = lines.len();
        for line in lines {
            self.send(conn, line);
        }

        self.send(conn, format!(":{us} ENDBURST"));
        info!(peer = %name, lines = count, "burst sent");
        self.link_notice(&format!("Finished bursting to {name}."));
    }

    /// Every server except the ones reached through `conn`, parents first.
    fn burst_servers(&self, conn: ConnId) -> Vec<String> {
        let mut lines = Vec::new();
        for (id, depth) in self.topology.walk() {
            let Some(server) = self.topology.get(id) else {
                continue;
            };
            let Some(parent) = server.parent().and_then(|p| self.topology.get(p)) else {
                continue;
            };
            if server.conn == Some(conn) {
                continue;
            }
            lines.push(format!(
                ":{} SERVER {} * {depth} :{}",
                parent.name, server.name, server.description
            ));
            if !server.version.is_empty() {
                lines.push(format!(":{} VERSION :{}", server.name, server.version));
            }
        }
        lines
    }

    fn burst_users(&self, conn: ConnId) -> Vec<String> {
        let mut lines = Vec::new();
        for user in self.store.users() {
            if self.user_route(&user.nick) == Some(conn) {
                continue;
            }
            lines.push(self.intro_line(user));
            if let Some(oper_type) = &user.oper_type {
                lines.push(format!(":{} OPERTYPE {}", user.nick, oper_type.replace(' ', "_")));
            }
            if let Some(away) = &user.away {
                lines.push(format!(":{} AWAY :{away}", user.nick));
            }
            let mut metadata: Vec<(String, String)> =
                user.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            for extension in &self.extensions {
                metadata.extend(extension.sync_user(user));
            }
            for (key, value) in metadata {
                lines.push(format!(
                    ":{} METADATA {} {key} :{value}",
                    self.config.server.name, user.nick
                ));
            }
        }
        lines
    }

    fn burst_channel(&self, channel: &Channel) -> Vec<String> {
        let us = &self.config.server.name;
        let (name, ts) = (&channel.name, channel.ts);
        let mut lines = Vec::new();

        // Members, batched so a long nick never pushes a line past the limit.
        let budget = FJOIN_LINE_BUDGET.saturating_sub(self.config.limits.nickmax);
        let head = format!(":{us} FJOIN {name} {ts} :");
        let mut line = head.clone();
        let mut items = 0;
        for member in channel.members.values() {
            let item = format!("{},{}", member.status.prefixes(), member.nick);
            if items > 0 && line.len() + item.len() + 1 > budget {
                lines.push(std::mem::replace(&mut line, head.clone()));
                items = 0;
            }
            if items > 0 {
                line.push(' ');
            }
            line.push_str(&item);
            items += 1;
        }
        if items > 0 {
            lines.push(line);
        }

        // A new channel defaults to +nt, so missing ones must be stated.
        let (mut modes, params) = channel.modes.to_mode_string();
        let unset: String = ['n', 't'].into_iter().filter(|m| !channel.modes.is_set(*m)).collect();
        if !unset.is_empty() {
            if modes == "+" {
                modes.clear();
            }
            modes.push('-');
            modes.push_str(&unset);
        }
        if modes != "+" {
            let params: String = params.iter().map(|p| format!(" {p}")).collect();
            lines.push(format!(":{us} FMODE {name} {ts} {modes}{params}"));
        }

        for (letter, entries) in &channel.modes.lists {
            let changes: Vec<ModeChange> = entries
                .iter()
                .map(|e| ModeChange::new(true, *letter, Some(&e.mask)))
                .collect();
            for modes in stack_modes(&changes, self.config.limits.maxmodes) {
                lines.push(format!(":{us} FMODE {name} {ts} {modes}"));
            }
        }

        if let Some(topic) = &channel.topic {
            lines.push(format!(
                ":{us} FTOPIC {name} {} {} :{}",
                topic.set_time, topic.setter, topic.text
            ));
        }

        let mut metadata: Vec<(String, String)> =
            channel.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        for extension in &self.extensions {
            metadata.extend(extension.sync_channel(channel));
        }
        for (key, value) in metadata {
            lines.push(format!(":{us} METADATA {name} {key} :{value}"));
        }
        lines
    }

    /// Global bans, then network-wide metadata.
    fn burst_network(&self) -> Vec<String> {
        let us = &self.config.server.name;
        let mut lines: Vec<String> = self
            .store
            .xlines()
            .into_iter()
            .filter(|x| x.kind.is_global())
            .map(|x| {
                format!(
                    ":{us} ADDLINE {} {} {} {} {} :{}",
                    x.kind.letter(),
                    x.mask,
                    x.setter,
                    x.set_time,
                    x.duration,
                    x.reason
                )
            })
            .collect();
        let mut metadata = self.store.network_metadata();
        for extension in &self.extensions {
            metadata.extend(extension.sync_network());
        }
        for (key, value) in metadata {
            lines.push(format!(":{us} METADATA * {key} :{value}"));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use crate::store::{Channel, EntityStore, MemberStatus, Topic, User, XLine, XLineKind};
    use crate::sync::{ConnId, SyncExtension};
    use crate::test_support::{HUB, has_notice, link, manager, manager_with, remote, sent, sent_to, user};

    struct Tagger;

    impl SyncExtension for Tagger {
        fn name(&self) -> &str {
            "tagger"
        }

        fn sync_user(&self, user: &User) -> Vec<(String, String)> {
            vec![("tag".into(), user.nick.to_uppercase())]
        }

        fn sync_channel(&self, channel: &Channel) -> Vec<(String, String)> {
            vec![("tag".into(), channel.name.clone())]
        }

        fn sync_network(&self) -> Vec<(String, String)> {
            vec![("netname".into(), "Example".into())]
        }
    }

    fn burst_to(sm: &mut crate::sync::SyncManager<crate::store::MemoryStore>, conn: ConnId) -> Vec<String> {
        sm.send_burst(conn);
        sent_to(&sent(sm), conn).into_iter().map(String::from).collect()
    }

    // ========================================================================
    // Ordering and framing
    // ========================================================================

    #[test]
    fn empty_burst_is_bracketed() {
        let mut sm = manager();
        let a = link(&mut sm, "leaf-a", 1);
        assert_eq!(
            burst_to(&mut sm, a),
            vec![
                ":hub.example.net BURST 1000000",
                ":hub.example.net VERSION :slircd-link-test",
                ":hub.example.net ENDBURST",
            ]
        );
        assert!(has_notice(&sm, "Bursting to leaf-a."));
        assert!(has_notice(&sm, "Finished bursting to leaf-a."));
    }

    #[test]
    fn time_master_forces_its_clock() {
        let mut sm = manager_with("[sync]\ntime_master = true");
        let a = link(&mut sm, "leaf-a", 1);
        assert_eq!(burst_to(&mut sm, a)[0], ":hub.example.net BURST 1000000 FORCE");
    }

    #[test]
    fn server_tree_excludes_target_subtree() {
        let mut sm = manager();
        link(&mut sm, "leaf-b", 2);
        remote(&mut sm, "leaf-b", "deep");
        let a = link(&mut sm, "leaf-a", 1);
        remote(&mut sm, "leaf-a", "behind-a");
        sm.handle_line(ConnId(2), ":deep VERSION :deepd-1.0");
        sm.take_actions();

        let lines = burst_to(&mut sm, a);
        assert_eq!(
            lines[2..5],
            [
                ":hub.example.net SERVER leaf-b * 1 :",
                ":leaf-b SERVER deep * 2 :",
                ":deep VERSION :deepd-1.0",
            ]
        );
        assert!(!lines.iter().any(|l| l.contains("behind-a") || l.contains("SERVER leaf-a")));
    }

    // ========================================================================
    // Users and channels
    // ========================================================================

    #[test]
    fn users_carry_oper_away_and_metadata() {
        let mut sm = manager();
        sm.register_extension(Box::new(Tagger));
        let a = link(&mut sm, "leaf-a", 1);
        let mut carol = user("carol", HUB);
        carol.oper_type = Some("Net Admin".into());
        carol.away = Some("lunch".into());
        carol.modes.insert('o');
        sm.add_user(carol);

        let lines = burst_to(&mut sm, a);
        assert_eq!(
            lines[2..6],
            [
                ":hub.example.net NICK 500 carol host.example host.example u +o 192.0.2.1 :Real Name",
                ":carol OPERTYPE Net_Admin",
                ":carol AWAY :lunch",
                ":hub.example.net METADATA carol tag :CAROL",
            ]
        );
    }

    #[test]
    fn channel_state_is_complete() {
        let mut sm = manager_with("[limits]\nmaxmodes = 2");
        let a = link(&mut sm, "leaf-a", 1);
        sm.add_user(user("carol", HUB));
        sm.add_user(user("dave", HUB));
        let chan = sm.store_mut().create_channel("#rust", 700);
        chan.add_member("carol", MemberStatus::OP);
        chan.add_member("dave", MemberStatus::default());
        chan.modes.flags.remove(&'t');
        chan.modes.flags.insert('m');
        chan.modes.key = Some("sekrit".into());
        for mask in ["a!*@*", "b!*@*", "c!*@*"] {
            chan.modes.apply(
                &crate::store::modes::ModeChange::new(true, 'b', Some(mask)),
                "carol",
                700,
            );
        }
        chan.topic = Some(Topic {
            text: "Ferris".into(),
            setter: "carol".into(),
            set_time: 710,
        });

        let lines = burst_to(&mut sm, a);
        let channel_lines: Vec<&str> = lines
            .iter()
            .map(String::as_str)
            .filter(|l| l.contains("#rust"))
            .collect();
        assert_eq!(
            channel_lines,
            vec![
                ":hub.example.net FJOIN #rust 700 :@,carol ,dave",
                ":hub.example.net FMODE #rust 700 +mnk-t sekrit",
                ":hub.example.net FMODE #rust 700 +bb a!*@* b!*@*",
                ":hub.example.net FMODE #rust 700 +b c!*@*",
                ":hub.example.net FTOPIC #rust 710 carol :Ferris",
            ]
        );
    }

    #[test]
    fn large_membership_is_split() {
        let mut sm = manager();
        let a = link(&mut sm, "leaf-a", 1);
        let chan = sm.store_mut().create_channel("#big", 700);
        for i in 0..100 {
            chan.add_member(&format!("member{i:03}"), MemberStatus::default());
        }
        let lines = burst_to(&mut sm, a);
        let fjoins: Vec<&String> = lines.iter().filter(|l| l.contains(" FJOIN ")).collect();
        assert!(fjoins.len() > 1);
        let budget = super::FJOIN_LINE_BUDGET - sm.config().limits.nickmax;
        assert!(fjoins.iter().all(|l| l.len() <= budget));
        let members: usize = fjoins
            .iter()
            .map(|l| l.rsplit_once(" :").unwrap().1.split(' ').count())
            .sum();
        assert_eq!(members, 100);
    }

    // ========================================================================
    // Bans and network metadata
    // ========================================================================

    #[test]
    fn only_global_bans_are_sent() {
        let mut sm = manager();
        sm.register_extension(Box::new(Tagger));
        let a = link(&mut sm, "leaf-a", 1);
        for (kind, mask) in [(XLineKind::G, "*@bad.example"), (XLineKind::K, "*@local.example")] {
            sm.store_mut().add_xline(XLine {
                kind,
                mask: mask.into(),
                setter: "carol".into(),
                set_time: 900,
                duration: 0,
                reason: "spam".into(),
            });
        }
        let lines = burst_to(&mut sm, a);
        assert_eq!(
            lines[2..lines.len() - 1],
            [
                ":hub.example.net ADDLINE G *@bad.example carol 900 0 :spam",
                ":hub.example.net METADATA * netname :Example",
            ]
        );
    }
}
