//! Integration test: netburst
//!
//! State built on one server before linking must arrive intact on the
//! other, and conflicting channel state must resolve the same way on both
//! sides.

mod common;

use common::{Net, T, user};
use slircd_link::EntityStore;
use slircd_link::store::{MemberStatus, XLine, XLineKind};

fn gline(mask: &str) -> XLine {
    XLine {
        kind: XLineKind::G,
        mask: mask.into(),
        setter: "oper".into(),
        set_time: T - 10,
        duration: 0,
        reason: "no thanks".into(),
    }
}

/// Users, channels, modes, topics and bans all cross in the burst.
#[test]
fn test_burst_carries_full_state() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T)]);
    {
        let alpha = net.sm(0);
        for nick in ["alice", "adam", "ava"] {
            alpha.local_connect(user(nick));
        }
        alpha.local_away("adam", Some("lunch"));
        alpha.local_oper("ava", "Net Admin");
        alpha.local_join("alice", "#rust");
        alpha.local_join("adam", "#rust");
        alpha.local_join("ava", "#ops");
        alpha.local_channel_mode("alice", "#rust", "+ntk", &["sekrit".to_string()]);
        alpha.local_channel_mode("alice", "#rust", "+b", &["*!*@spam.example".to_string()]);
        alpha.local_topic("alice", "#rust", "Fearless concurrency");
        alpha.local_xline_add(gline("*@bad.example"));
        alpha.local_xline_add(XLine {
            kind: XLineKind::K,
            ..gline("*@local-only.example")
        });
    }
    net.pump();
    net.link(0, 1);

    assert_eq!(net.nicks(1), vec!["adam", "alice", "ava"]);
    let beta = &net.nodes[1].sm;
    let adam = beta.store().user("adam").unwrap();
    assert_eq!(adam.server, "alpha.test");
    assert_eq!(adam.away.as_deref(), Some("lunch"));
    let ava = beta.store().user("ava").unwrap();
    assert!(ava.modes.contains(&'o'));
    assert_eq!(ava.oper_type.as_deref(), Some("Net_Admin"));

    let alpha_node = beta.topology().find_by_name("alpha.test").unwrap();
    assert_eq!(beta.topology().get(alpha_node).unwrap().user_count, 3);

    let rust = beta.store().channel("#rust").unwrap();
    assert_eq!(rust.ts, T);
    assert_eq!(rust.member("alice").unwrap().status, MemberStatus::OP);
    assert_eq!(rust.member("adam").unwrap().status, MemberStatus::default());
    assert!(rust.modes.is_set('n'));
    assert!(rust.modes.is_set('t'));
    assert_eq!(rust.modes.key.as_deref(), Some("sekrit"));
    assert_eq!(rust.modes.lists.get(&'b').map(Vec::len), Some(1));
    assert_eq!(rust.topic.as_ref().unwrap().text, "Fearless concurrency");
    assert!(beta.store().channel("#ops").unwrap().member("ava").is_some());

    let masks: Vec<String> = beta.store().xlines().iter().map(|x| x.mask.clone()).collect();
    assert_eq!(masks, vec!["*@bad.example"]);
}

/// The older channel keeps its status holders; the younger side's ops are
/// stripped everywhere.
#[test]
fn test_older_channel_wins_on_both_sides() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T)]);
    net.sm(0).local_connect(user("alice"));
    net.sm(1).local_connect(user("bob"));
    net.sm(0)
        .store_mut()
        .create_channel("#rust", T - 500)
        .add_member("alice", MemberStatus::OP);
    net.sm(1)
        .store_mut()
        .create_channel("#rust", T - 100)
        .add_member("bob", MemberStatus::OP);
    net.link(0, 1);

    for i in 0..2 {
        let chan = net.nodes[i].sm.store().channel("#rust").unwrap();
        assert_eq!(chan.ts, T - 500, "node {i}");
        assert_eq!(chan.member("alice").unwrap().status, MemberStatus::OP, "node {i}");
        assert_eq!(chan.member("bob").unwrap().status, MemberStatus::default(), "node {i}");
    }
}

/// Equal timestamps merge both member lists with their status.
#[test]
fn test_equal_channel_ts_merges() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T)]);
    net.sm(0).local_connect(user("alice"));
    net.sm(1).local_connect(user("bob"));
    net.sm(0)
        .store_mut()
        .create_channel("#rust", T - 100)
        .add_member("alice", MemberStatus::OP);
    net.sm(1)
        .store_mut()
        .create_channel("#rust", T - 100)
        .add_member("bob", MemberStatus::OP);
    net.link(0, 1);

    for i in 0..2 {
        let chan = net.nodes[i].sm.store().channel("#rust").unwrap();
        assert_eq!(chan.members.len(), 2, "node {i}");
        assert_eq!(chan.member("alice").unwrap().status, MemberStatus::OP, "node {i}");
        assert_eq!(chan.member("bob").unwrap().status, MemberStatus::OP, "node {i}");
    }
}

/// A ban arriving in the burst removes matching local users once the
/// burst ends, and the rest of the network hears about it.
#[test]
fn test_burst_ban_applies_after_endburst() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T)]);
    net.sm(0).local_xline_add(gline("*@spammer.example.org"));
    net.sm(1).local_connect(user("spammer"));
    net.sm(1).local_connect(user("bob"));
    net.link(0, 1);

    assert_eq!(net.nicks(0), vec!["bob"]);
    assert_eq!(net.nicks(1), vec!["bob"]);
}

/// Both sides introduce their users to each other; a nick present on both
/// is removed everywhere.
#[test]
fn test_colliding_nicks_are_killed() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T)]);
    net.sm(0).local_connect(user("alice"));
    net.sm(0).local_connect(user("twin"));
    net.sm(1).local_connect(user("bob"));
    net.sm(1).local_connect(user("twin"));
    net.link(0, 1);

    assert_eq!(net.nicks(0), vec!["alice", "bob"]);
    assert_eq!(net.nicks(1), vec!["alice", "bob"]);
}

/// A third server joining later receives everything both others know.
#[test]
fn test_burst_relays_known_network() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T), ("gamma.test", T)]);
    net.sm(0).local_connect(user("alice"));
    net.sm(1).local_connect(user("bob"));
    net.link(0, 1);
    net.link(2, 1);

    assert_eq!(net.nicks(2), vec!["alice", "bob"]);
    let gamma = &net.nodes[2].sm;
    let alpha = gamma.topology().find_by_name("alpha.test").unwrap();
    assert_eq!(gamma.topology().hops(alpha), 2);
    assert_eq!(gamma.topology().get(alpha).unwrap().user_count, 1);
    assert_eq!(net.nicks(0), vec!["alice", "bob"]);
}
