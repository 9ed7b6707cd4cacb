//! Integration test: link handshake
//!
//! Two or more managers wired through the in-process harness negotiate,
//! authenticate and burst exactly as they would over TCP.

mod common;

use common::{Net, PASSWORD, T, ip, node_config};
use slircd_link::sync::LinkState;

/// A clean handshake leaves both ends CONNECTED with each other in the tree.
#[test]
fn test_two_servers_link() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T)]);
    net.link(0, 1);

    assert!(net.knows(0, 1));
    assert!(net.knows(1, 0));
    assert_eq!(net.live_links(0), 1);
    assert_eq!(net.live_links(1), 1);
    for node in &net.nodes {
        node.sm.topology().check_invariants().unwrap();
        assert!(node.sm.connections().all(|c| !c.bursting));
    }

    assert!(net.has_notice(0, "Bursting to beta.test."));
    assert!(net.has_notice(0, "Received end of netburst from beta.test"));
    assert!(net.has_notice(1, "Finished bursting to alpha.test."));
    assert!(net.has_notice(
        1,
        &format!("Verified incoming server connection from alpha.test[{}] (alpha.test test server)", ip(0))
    ));
}

/// The remote server's version string travels with the burst.
#[test]
fn test_versions_are_exchanged() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T)]);
    net.link(0, 1);
    let topology = net.nodes[0].sm.topology();
    let beta = topology.find_by_name("beta.test").unwrap();
    assert_eq!(topology.get(beta).unwrap().version, "slircd-link-test");
}

/// A wrong password is refused and nothing is attached on either side.
#[test]
fn test_bad_password_is_refused() {
    let alpha = node_config("alpha.test", &[("beta.test", 1)], "");
    let mut beta = node_config("beta.test", &[("alpha.test", 0)], "");
    beta.links[0].recv_password = format!("not-{PASSWORD}");
    let mut net = Net::from_configs(vec![alpha, beta], vec![T, T]);
    net.link(0, 1);

    assert!(!net.knows(0, 1));
    assert!(!net.knows(1, 0));
    assert_eq!(net.nodes[0].sm.connections().count(), 0);
    assert_eq!(net.nodes[1].sm.connections().count(), 0);
    assert!(net.has_notice(1, "Server connection from alpha.test denied, invalid link credentials"));
    assert!(net.has_notice(0, "ERROR from beta.test: Invalid credentials"));
}

/// Mismatched protocol limits abort the link during CAPAB.
#[test]
fn test_capability_mismatch_aborts() {
    let alpha = node_config("alpha.test", &[("beta.test", 1)], "[limits]\nnickmax = 31");
    let beta = node_config("beta.test", &[("alpha.test", 0)], "[limits]\nnickmax = 20");
    let mut net = Net::from_configs(vec![alpha, beta], vec![T, T]);
    net.link(0, 1);

    assert!(!net.knows(0, 1));
    assert!(!net.knows(1, 0));
    assert_eq!(net.live_links(0), 0);
    assert_eq!(net.live_links(1), 0);
}

/// A peer whose address matches no link block never gets a session.
#[test]
fn test_unknown_address_is_refused() {
    let alpha = node_config("alpha.test", &[("beta.test", 1)], "");
    // beta only expects a server on an address alpha does not have.
    let beta = node_config("beta.test", &[("alpha.test", 9)], "");
    let mut net = Net::from_configs(vec![alpha, beta], vec![T, T]);
    net.link(0, 1);

    assert!(!net.knows(0, 1));
    assert!(net.has_notice(
        1,
        &format!(
            "Server connection from {} denied (no link blocks with that IP address)",
            ip(0)
        )
    ));
    assert!(net.has_notice(0, "CONNECT: Error connecting beta.test: Connection refused"));
}

/// Clocks further apart than the allowed skew refuse to link.
#[test]
fn test_excessive_clock_skew_aborts() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T + 3600)]);
    net.link(0, 1);

    assert!(!net.knows(0, 1));
    assert!(!net.knows(1, 0));
    assert!(net.has_notice(
        1,
        "ERROR: Your clocks are out by 3600 seconds (this is more than ten minutes). Link aborted, PLEASE SYNC YOUR CLOCKS!"
    ));
}

/// The same server cannot be attached twice.
#[test]
fn test_second_link_to_same_server_is_refused() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T), ("gamma.test", T)]);
    net.link(0, 1);
    net.link(2, 0);
    // gamma already sees beta through alpha.
    net.link(2, 1);

    for i in 0..3 {
        net.nodes[i].sm.topology().check_invariants().unwrap();
        assert_eq!(net.nodes[i].sm.topology().len(), 3);
    }
    assert_eq!(net.live_links(0), 2);
    assert_eq!(net.live_links(1), 1);
    assert_eq!(net.live_links(2), 1);
}

/// Losing a link splits off everything behind it.
#[test]
fn test_split_removes_servers_and_users() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T), ("gamma.test", T)]);
    net.link(0, 1);
    net.link(2, 1);
    net.sm(2).local_connect(common::user("carol"));
    net.pump();
    assert!(net.nicks(0).contains(&"carol".to_string()));

    net.cut(1, 2);
    assert!(!net.knows(0, 2));
    assert!(!net.knows(1, 2));
    assert!(!net.nicks(0).contains(&"carol".to_string()));
    assert!(net.has_notice(1, "Connection to 'gamma.test' failed."));
    net.nodes[0].sm.topology().check_invariants().unwrap();
}

/// Outbound attempts are recorded as CONNECTING until the peer answers.
#[test]
fn test_connect_queues_attempt() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T)]);
    let conn = net.sm(0).connect("beta.test").unwrap();
    assert_eq!(net.nodes[0].sm.connection(conn).unwrap().state, LinkState::Connecting);
    assert!(net.sm(0).connect("nowhere.test").is_err());
    net.pump();
    assert_eq!(net.nodes[0].sm.connection(conn).unwrap().state, LinkState::Connected);
}
