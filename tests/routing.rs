//! Integration test: routing across a three-server chain
//!
//! alpha.test <-> beta.test <-> gamma.test, with beta as the hub. Every
//! line must reach exactly the servers that need it, through the tree.

mod common;

use common::{Net, T, user};
use slircd_link::EntityStore;
use slircd_link::store::MemberStatus;

fn chain() -> Net {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T), ("gamma.test", T)]);
    net.link(0, 1);
    net.link(2, 1);
    net.sm(0).local_connect(user("alice"));
    net.sm(2).local_connect(user("carol"));
    net.pump();
    net
}

#[test]
fn test_tree_is_consistent_everywhere() {
    let net = chain();
    for node in &net.nodes {
        let topology = node.sm.topology();
        topology.check_invariants().unwrap();
        assert_eq!(topology.len(), 3);
    }
    let alpha = &net.nodes[0].sm;
    let gamma = alpha.topology().find_by_name("gamma.test").unwrap();
    let beta = alpha.topology().find_by_name("beta.test").unwrap();
    assert_eq!(alpha.topology().hops(gamma), 2);
    assert_eq!(alpha.topology().get(gamma).unwrap().parent(), Some(beta));
    // gamma is reached over the link to beta.
    assert_eq!(
        alpha.topology().get(gamma).unwrap().conn,
        alpha.topology().get(beta).unwrap().conn
    );
}

#[test]
fn test_private_message_crosses_the_hub() {
    let mut net = chain();
    net.sm(0).local_message("alice", "PRIVMSG", "carol", "hello", &[]);
    net.pump();

    assert_eq!(
        net.delivered(2, "PRIVMSG carol :hello"),
        vec!["carol <- :alice!alice@alice.example.org PRIVMSG carol :hello"]
    );
    assert!(net.delivered(1, "hello").is_empty());
}

#[test]
fn test_channel_message_reaches_remote_members() {
    let mut net = chain();
    net.sm(2).local_connect(user("dave"));
    net.sm(0).local_join("alice", "#chat");
    net.pump();
    net.sm(2).local_join("carol", "#chat");
    net.sm(2).local_join("dave", "#chat");
    net.pump();

    for i in 0..3 {
        let chan = net.nodes[i].sm.store().channel("#chat").unwrap();
        assert_eq!(chan.members.len(), 3, "node {i}");
        assert_eq!(chan.member("alice").unwrap().status, MemberStatus::OP, "node {i}");
    }

    net.sm(0).local_message("alice", "PRIVMSG", "#chat", "hi all", &[]);
    net.pump();
    let got = net.delivered(2, "PRIVMSG #chat :hi all");
    assert_eq!(got.len(), 2);
    assert!(got.iter().any(|l| l.starts_with("carol <- ")));
    assert!(got.iter().any(|l| l.starts_with("dave <- ")));
}

#[test]
fn test_status_prefixed_message_only_reaches_ops() {
    let mut net = chain();
    net.sm(2).local_join("carol", "#chat");
    net.pump();
    net.sm(0).local_join("alice", "#chat");
    net.pump();

    // carol created the channel and holds ops; alice does not.
    net.sm(0).local_message("alice", "NOTICE", "@#chat", "ops only", &[]);
    net.pump();
    assert_eq!(net.delivered(2, "ops only").len(), 1);
    assert!(net.delivered(0, "ops only").is_empty());
}

#[test]
fn test_nick_and_quit_propagate() {
    let mut net = chain();
    assert!(net.sm(0).local_nick("alice", "alicia", T));
    net.pump();
    assert!(net.nicks(2).contains(&"alicia".to_string()));
    assert!(!net.nicks(2).contains(&"alice".to_string()));

    net.sm(0).local_quit("alicia", "bye");
    net.pump();
    for i in 0..3 {
        assert_eq!(net.nicks(i), vec!["carol"], "node {i}");
    }
    let alpha_node = net.nodes[2].sm.topology().find_by_name("alpha.test").unwrap();
    assert_eq!(net.nodes[2].sm.topology().get(alpha_node).unwrap().user_count, 0);
}

#[test]
fn test_kill_removes_user_everywhere() {
    let mut net = chain();
    net.sm(0).local_kill("alice", "carol", "spamming");
    net.pump();
    for i in 0..3 {
        assert_eq!(net.nicks(i), vec!["alice"], "node {i}");
    }
    assert_eq!(
        net.delivered(2, "KILL carol"),
        vec!["carol <- :alpha.test KILL carol :alpha.test ([alpha.test] Killed (spamming))"]
    );
}

#[test]
fn test_topic_and_kick_propagate() {
    let mut net = chain();
    net.sm(0).local_join("alice", "#chat");
    net.pump();
    net.sm(2).local_join("carol", "#chat");
    net.pump();

    net.sm(0).local_topic("alice", "#chat", "welcome");
    net.pump();
    assert_eq!(
        net.nodes[2].sm.store().channel("#chat").unwrap().topic.as_ref().unwrap().text,
        "welcome"
    );

    net.sm(0).local_kick("alice", "#chat", "carol", "out");
    net.pump();
    for i in 0..3 {
        let chan = net.nodes[i].sm.store().channel("#chat").unwrap();
        assert!(chan.member("carol").is_none(), "node {i}");
    }
}

#[test]
fn test_stale_mode_change_is_bounced() {
    let mut net = chain();
    net.sm(0).local_join("alice", "#chat");
    net.pump();
    net.sm(2).local_join("carol", "#chat");
    net.pump();

    // gamma believes the channel is younger than it really is.
    net.sm(2).store_mut().channel_mut("#chat").unwrap().ts = T + 500;
    net.sm(2).local_channel_mode("carol", "#chat", "+m", &[]);
    net.pump();

    for i in 0..3 {
        let chan = net.nodes[i].sm.store().channel("#chat").unwrap();
        assert!(!chan.modes.is_set('m'), "node {i}");
    }
}

#[test]
fn test_remote_query_answered_by_target() {
    let mut net = chain();
    net.sm(0).remote_version("alice", "gamma.test");
    net.pump();
    assert_eq!(
        net.delivered(0, " 351 "),
        vec!["alice <- :alpha.test 351 alice gamma.test :slircd-link-test"]
    );

    net.sm(0).remote_time("alice", "gamma.test");
    net.pump();
    assert_eq!(net.delivered(0, " 391 ").len(), 1);
}

#[test]
fn test_operator_squit_of_distant_server() {
    let mut net = chain();
    net.sm(0).squit_command("alice", "gamma.test", "maintenance");
    net.pump();
    for i in 0..2 {
        assert!(!net.knows(i, 2), "node {i}");
        assert_eq!(net.nicks(i), vec!["alice"], "node {i}");
    }
    assert_eq!(net.live_links(1), 1);
}
