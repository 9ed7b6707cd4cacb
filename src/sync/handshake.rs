//! Link handshake.
//!
//! ```text
//! outbound (us)                        inbound (peer)
//! CAPAB START..END, SERVER us pw 0 ->  WaitAuth1
//! Connecting             <- CAPAB START..END, SERVER peer pw 0
//! WaitAuth2 -> Connected, burst ->     WaitAuth2
//!                                      BURST received: timesync, Connected, burst
//! ```
//!
//! The handler functions here serve the pre-CONNECTED states of the
//! dispatch table.

use slirc_wire::Line;
use tracing::{debug, info, warn};

use crate::error::{HandlerResult, LinkError};
use crate::handlers::Context;
use crate::store::EntityStore;

use super::capab;
use super::link::{ConnId, LinkState};
use super::manager::SyncManager;

/// `SERVER <name> <password> <hops> :<description>`
struct ServerIntro<'a> {
    name: &'a str,
    password: &'a str,
    hops: &'a str,
    description: &'a str,
}

impl<'a> ServerIntro<'a> {
    fn parse(line: &'a Line) -> Result<Self, LinkError> {
        match line.params.as_slice() {
            [name, password, hops, description, ..] => Ok(Self {
                name,
                password,
                hops,
                description,
            }),
            _ => Err(LinkError::protocol("Invalid number of parameters for SERVER")),
        }
    }
}

impl<S: EntityStore> SyncManager<S> {
    /// Shared credential checks for both directions. Returns the password
    /// to send back.
    fn authenticate_server(&mut self, intro: &ServerIntro<'_>) -> Result<String, LinkError> {
        if intro.hops.parse::<u32>().unwrap_or(1) != 0 {
            self.link_notice(&format!(
                "Server connection from {} denied, server is too far away for authentication",
                intro.name
            ));
            return Err(LinkError::protocol("Server too far away for authentication"));
        }
        let Some(block) = self.registry.authenticate(intro.name, intro.password) else {
            self.link_notice(&format!(
                "Server connection from {} denied, invalid link credentials",
                intro.name
            ));
            return Err(LinkError::Credentials("Invalid credentials".into()));
        };
        let send_password = block.send_password.clone();
        self.check_unique(intro.name)?;
        Ok(send_password)
    }

    /// Refuse a server name already present in the tree.
    fn check_unique(&mut self, name: &str) -> HandlerResult {
        let Some(existing) = self.topology.find_by_name(name) else {
            return Ok(());
        };
        let parent = self
            .topology
            .get(existing)
            .and_then(|n| n.parent())
            .and_then(|p| self.topology.get(p))
            .map(|p| p.name.clone())
            .unwrap_or_else(|| self.config.server.name.clone());
        self.link_notice(&format!(
            "Server connection from {name} denied, already exists on server {parent}"
        ));
        Err(LinkError::Topology(format!(
            "Server {name} already exists on server {parent}!"
        )))
    }

    /// Move a fully authenticated connection to CONNECTED: attach its node,
    /// announce it to the rest of the network and send our burst.
    pub(crate) fn complete_link(&mut self, conn: ConnId) -> HandlerResult {
        let Some(peer) = self.conns.get(&conn) else {
            return Ok(());
        };
        let name = peer.label();
        let description = peer.remote_desc.clone();

        let root = self.topology.root();
        let node = self
            .topology
            .add_child(root, &name, &description, conn)
            .map_err(|e| LinkError::Topology(format!("{e}")))?;
        let now = self.now();
        let ping_interval = self.config.sync.ping_interval as i64;
        if let Some(n) = self.topology.get_mut(node) {
            n.ping_due = now + ping_interval;
            n.ping_answered = true;
        }
        if let Some(peer) = self.conns.get_mut(&conn) {
            peer.state = LinkState::Connected;
            peer.bursting = true;
            peer.deadline = None;
        }
        info!(conn = %conn, peer = %name, "link established");

        let us = self.config.server.name.clone();
        self.to_all_but(Some(conn), &format!(":{us} SERVER {name} * 1 :{description}"));
        for extension in &mut self.extensions {
            extension.on_new_server(&name);
        }
        self.send_burst(conn);
        Ok(())
    }

    /// Clock agreement when the peer's `BURST <ts> [FORCE]` arrives. Returns
    /// the time every server should converge on, and whether it is forced,
    /// if a broadcast is owed.
    fn burst_timesync(&mut self, line: &Line) -> Result<Option<(i64, bool)>, LinkError> {
        if !self.config.sync.time_sync {
            return Ok(None);
        }
        let Some(them) = line.param(0).and_then(|t| t.parse::<i64>().ok()) else {
            return Ok(None);
        };
        let force = line.param(1) == Some("FORCE");
        let us = self.now();
        let delta = them - us;

        if delta.abs() > self.config.sync.max_clock_skew {
            let text = format!(
                "Your clocks are out by {} seconds (this is more than ten minutes). Link aborted, PLEASE SYNC YOUR CLOCKS!",
                delta.abs()
            );
            self.link_notice(&format!("ERROR: {text}"));
            return Err(LinkError::Protocol(text));
        }
        if delta == 0 {
            return Ok(None);
        }
        if force {
            let old = self.clock.adjust(delta);
            debug!(delta, old_offset = old, "clock forced at link time");
            Ok(Some((them, true)))
        } else if self.config.sync.time_master {
            Ok(Some((us, true)))
        } else if us > them {
            let old = self.clock.adjust(delta);
            debug!(delta, old_offset = old, "clock adjusted at link time");
            Ok(Some((them, false)))
        } else {
            Ok(Some((us, false)))
        }
    }
}

// ============================================================================
// Dispatch table entries for the handshake states
// ============================================================================

/// `CAPAB` in any pre-CONNECTED state.
pub(crate) fn capab<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let Some(sub) = line.param(0) else {
        return Err(LinkError::protocol(
            "Invalid number of parameters for CAPAB - Mismatched version",
        ));
    };
    let Some(peer) = sm.conns.get_mut(&ctx.conn) else {
        return Ok(());
    };
    match (sub, line.params.len()) {
        ("START", _) => peer.capab.reset(),
        ("MODULES", 2) => peer.capab.add_modules(&line.params[1]),
        ("CAPABILITIES", 2) => peer.capab.add_capabilities(&line.params[1]),
        ("END", _) => {
            capab::negotiate(&peer.capab, &sm.config.sync.modules, &sm.config.limits)
                .map_err(LinkError::Negotiation)?;
            debug!(conn = %ctx.conn, "capabilities agreed");
        }
        _ => {}
    }
    Ok(())
}

/// `SERVER` from a peer that connected to us.
pub(crate) fn inbound_server<S: EntityStore>(
    sm: &mut SyncManager<S>,
    ctx: &Context<'_>,
    line: &Line,
) -> HandlerResult {
    let intro = ServerIntro::parse(line)?;
    let send_password = sm.authenticate_server(&intro)?;

    let addr = sm
        .conns
        .get(&ctx.conn)
        .and_then(|c| c.addr)
        .map(|a| a.ip().to_string())
        .unwrap_or_default();
    let shown = if sm.registry.find(intro.name).is_some_and(|b| b.hidden) {
        "<hidden>".to_string()
    } else {
        addr
    };
    sm.link_notice(&format!(
        "Verified incoming server connection from {}[{shown}] ({})",
        intro.name, intro.description
    ));

    let reply = format!(
        "SERVER {} {send_password} 0 :{}",
        sm.config.server.name, sm.config.server.description
    );
    sm.send(ctx.conn, reply);

    let block = sm.registry.find(intro.name).cloned();
    if let Some(peer) = sm.conns.get_mut(&ctx.conn) {
        peer.remote_name = Some(intro.name.to_string());
        peer.remote_desc = intro.description.to_string();
        peer.link = block;
        peer.state = LinkState::WaitAuth2;
    }
    Ok(())
}

/// `SERVER` answering our own introduction on an outbound link.
pub(crate) fn outbound_reply<S: EntityStore>(
    sm: &mut SyncManager<S>,
    ctx: &Context<'_>,
    line: &Line,
) -> HandlerResult {
    let intro = ServerIntro::parse(line)?;
    sm.authenticate_server(&intro)?;
    if let Some(peer) = sm.conns.get_mut(&ctx.conn) {
        peer.remote_name = Some(intro.name.to_string());
        peer.remote_desc = intro.description.to_string();
        peer.state = LinkState::WaitAuth2;
    }
    sm.complete_link(ctx.conn)
}

/// `BURST` from an inbound peer: agree on the time, then go live.
pub(crate) fn burst_start<S: EntityStore>(
    sm: &mut SyncManager<S>,
    ctx: &Context<'_>,
    line: &Line,
) -> HandlerResult {
    let agreed = sm.burst_timesync(line)?;
    sm.complete_link(ctx.conn)?;
    if let Some((ts, forced)) = agreed {
        let us = sm.config.server.name.clone();
        let force = if forced { " FORCE" } else { "" };
        sm.to_all_but(None, &format!(":{us} TIMESET {ts}{force}"));
    }
    Ok(())
}

pub(crate) fn client_on_server_port<S: EntityStore>(
    _sm: &mut SyncManager<S>,
    _ctx: &Context<'_>,
    _line: &Line,
) -> HandlerResult {
    Err(LinkError::protocol("Client connections to this port are prohibited."))
}

pub(crate) fn old_mesh<S: EntityStore>(_sm: &mut SyncManager<S>, _ctx: &Context<'_>, _line: &Line) -> HandlerResult {
    Err(LinkError::protocol(
        "Cannot use the old-style mesh linking protocol with m_spanningtree.so!",
    ))
}

pub(crate) fn listener_line<S: EntityStore>(
    _sm: &mut SyncManager<S>,
    _ctx: &Context<'_>,
    _line: &Line,
) -> HandlerResult {
    Err(LinkError::protocol(
        "Internal error -- listening socket accepted its own descriptor!!!",
    ))
}

/// Anything unexpected before authentication.
pub(crate) fn invalid_in_negotiation<S: EntityStore>(
    _sm: &mut SyncManager<S>,
    _ctx: &Context<'_>,
    line: &Line,
) -> HandlerResult {
    Err(LinkError::Protocol(format!(
        "Invalid command in negotiation phase: {}",
        line.command
    )))
}

/// Lines tolerated and dropped during the handshake.
pub(crate) fn ignore<S: EntityStore>(_sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    debug!(conn = %ctx.conn, command = %line.command, "ignored during handshake");
    Ok(())
}

/// `ERROR :<reason>` in any state.
pub(crate) fn error<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let reason = line.param(0).unwrap_or_default();
    let name = sm.peer_name(ctx.conn);
    warn!(conn = %ctx.conn, peer = %name, reason = %reason, "ERROR from peer");
    sm.link_notice(&format!("ERROR from {name}: {reason}"));
    Err(LinkError::Closed(format!("ERROR from {name}: {reason}")))
}
