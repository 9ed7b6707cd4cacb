//! Remote server introduction and removal.

use slirc_wire::Line;
use tracing::{debug, info};

use crate::error::{HandlerResult, LinkError};
use crate::handlers::Context;
use crate::store::EntityStore;
use crate::sync::SyncManager;

/// `:<parent> SERVER <name> <password> <hops> :<description>`
///
/// A server behind the peer. Its parent must already be known and its name
/// must be new; either failure closes the link carrying it.
pub(crate) fn server<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [name, _password, hops, description, ..] = line.params.as_slice() else {
        return Err(LinkError::protocol("Invalid number of parameters for SERVER"));
    };
    let parent = ctx.source;
    let Some(parent_id) = sm.topology.find_by_name(parent) else {
        return Err(LinkError::Protocol(format!(
            "Protocol error - Introduced remote server from unknown server {parent}"
        )));
    };
    if sm.topology.find_by_name(name).is_some() {
        sm.link_notice(&format!("Server connection from {name} denied, already exists"));
        return Err(LinkError::Topology(format!("Server {name} already exists!")));
    }

    sm.topology
        .add_child(parent_id, name, description, ctx.conn)
        .map_err(|e| LinkError::Topology(e.to_string()))?;
    let hops = hops.parse::<u32>().unwrap_or(0) + 1;
    sm.to_all_but(
        Some(ctx.conn),
        &format!(":{parent} SERVER {name} * {hops} :{description}"),
    );
    for extension in &mut sm.extensions {
        extension.on_new_server(name);
    }
    info!(server = %name, parent = %parent, "remote server introduced");
    sm.link_notice(&format!("Server {parent} introduced server {name} ({description})"));
    Ok(())
}

/// `:<source> SQUIT <server> :<reason>`
///
/// Only a server behind the sender can be removed this way. If the sender
/// names itself the whole link goes.
pub(crate) fn squit<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [target, reason] = line.params.as_slice() else {
        return Ok(());
    };
    let Some(node) = sm.topology.find_by_name(target) else {
        return Ok(());
    };
    if sm.topology.get(node).and_then(|n| n.conn) != Some(ctx.conn) {
        debug!(target = %target, conn = %ctx.conn, "SQUIT for a server not behind this link");
        return Ok(());
    }
    if sm.topology.peer_for_conn(ctx.conn) == Some(node) {
        sm.drop_connection(ctx.conn, reason);
    } else {
        sm.squit(node, reason);
    }
    Ok(())
}

/// `:<oper> RSQUIT <mask> :<reason>`: an operator elsewhere asked for a
/// link to be dropped. Acted on only by the server holding that link.
pub(crate) fn rsquit<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    if line.params.len() < 2 {
        return Ok(());
    }
    let mask = &line.params[0];
    let reason = &line.params[line.params.len() - 1];
    let Some(node) = sm.topology.find_by_mask(mask) else {
        return Ok(());
    };
    if node == sm.topology.root() {
        sm.link_notice(&format!(
            "Received a remote SQUIT for the local server (from {})",
            ctx.source
        ));
        return Ok(());
    }
    let (name, conn) = match sm.topology.get(node) {
        Some(n) => (n.name.clone(), n.conn),
        None => return Ok(()),
    };
    match conn {
        Some(conn) if sm.topology.peer_for_conn(conn) == Some(node) => {
            sm.link_notice(&format!(
                "RSQUIT: Server {name} removed from network by {}: {reason}",
                ctx.source
            ));
            sm.drop_connection(conn, &format!("Server quit by {}: {reason}", ctx.source));
        }
        _ => {
            sm.to_server(&name, ctx.raw);
        }
    }
    Ok(())
}
