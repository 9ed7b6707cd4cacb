//! Integration test: clocks and liveness
//!
//! Servers agree on one network time when they link, and a peer that stops
//! answering PINGs is cut loose.

mod common;

use common::{Net, T};

/// The slower clock steps back to the older time at link, and a later
/// arrival is corrected by the TIMESET that follows.
#[test]
fn test_clocks_converge_across_three_servers() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T + 50), ("gamma.test", T + 20)]);
    net.link(0, 1);
    assert_eq!(net.nodes[1].sm.now(), T);
    assert_eq!(net.nodes[1].sm.clock().offset(), -50);

    net.link(2, 0);
    for i in 0..3 {
        assert_eq!(net.nodes[i].sm.now(), T, "node {i}");
    }
    assert_eq!(net.nodes[0].sm.clock().offset(), 0);
}

/// A time master's clock is adopted even when it is ahead.
#[test]
fn test_time_master_forces_its_clock() {
    let mut net = Net::with_extra(&[("alpha.test", T + 30), ("beta.test", T)], |i| {
        if i == 0 {
            "[sync]\ntime_master = true".to_string()
        } else {
            String::new()
        }
    });
    net.link(0, 1);
    assert_eq!(net.nodes[0].sm.now(), T + 30);
    assert_eq!(net.nodes[1].sm.now(), T + 30);
}

/// A forced clock reaches servers that were already linked, and nobody
/// answers it with an earlier time.
#[test]
fn test_forced_clock_reaches_a_third_server() {
    let mut net = Net::with_extra(
        &[("alpha.test", T), ("beta.test", T + 50), ("gamma.test", T)],
        |i| {
            if i == 1 {
                "[sync]\ntime_master = true".to_string()
            } else {
                String::new()
            }
        },
    );
    net.link(2, 0);
    net.link(1, 0);
    for i in 0..3 {
        assert_eq!(net.nodes[i].sm.now(), T + 50, "node {i}");
    }
}

/// A time master accepting a link keeps its clock and pushes it out.
#[test]
fn test_time_master_keeps_its_clock_on_inbound_link() {
    let mut net = Net::with_extra(&[("alpha.test", T), ("beta.test", T + 30)], |i| {
        if i == 1 {
            "[sync]\ntime_master = true".to_string()
        } else {
            String::new()
        }
    });
    net.link(0, 1);
    assert_eq!(net.nodes[0].sm.now(), T + 30);
    assert_eq!(net.nodes[1].sm.now(), T + 30);
}

/// With time sync off nothing moves.
#[test]
fn test_disabled_time_sync_leaves_clocks_alone() {
    let mut net = Net::with_extra(&[("alpha.test", T), ("beta.test", T + 50)], |_| {
        "[sync]\ntime_sync = false".to_string()
    });
    net.link(0, 1);
    assert!(net.knows(0, 1));
    assert_eq!(net.nodes[1].sm.now(), T + 50);
}

/// The periodic TIMESET pulls a drifting server back.
#[test]
fn test_periodic_timeset_corrects_drift() {
    let mut net = Net::with_extra(&[("alpha.test", T), ("beta.test", T)], |_| {
        "[sync]\ntimesync_interval = 600\nping_interval = 10000".to_string()
    });
    net.link(0, 1);
    net.sm(1).clock_mut().adjust(40);

    net.advance(600);
    net.tick();
    assert_eq!(net.nodes[0].sm.now(), T + 600);
    assert_eq!(net.nodes[1].sm.now(), T + 600);
}

/// A peer answering PINGs stays linked indefinitely.
#[test]
fn test_answered_pings_keep_the_link() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T)]);
    net.link(0, 1);
    for _ in 0..5 {
        net.advance(60);
        net.tick();
    }
    assert!(net.knows(0, 1));
    assert!(net.knows(1, 0));
    let alpha = &net.nodes[0].sm;
    let beta = alpha.topology().find_by_name("beta.test").unwrap();
    assert_eq!(alpha.topology().get(beta).unwrap().missed_pings, 0);
}

/// Two unanswered PINGs in a row drop the link on both ends.
#[test]
fn test_silent_peer_pings_out() {
    let mut net = Net::new(&[("alpha.test", T), ("beta.test", T)]);
    net.link(0, 1);

    for _ in 0..3 {
        net.sm(0).clock_mut().advance(60);
        net.sm(0).tick();
        // beta never hears the PING.
        if net.knows(0, 1) {
            net.sm(0).take_actions();
        }
    }
    assert!(!net.knows(0, 1));
    assert!(net.has_notice(0, "Server beta.test pinged out"));

    net.pump();
    assert!(!net.knows(1, 0));
    assert_eq!(net.live_links(1), 0);
}
