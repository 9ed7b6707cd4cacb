//! Liveness: `PING` and `PONG`.
//!
//! A direct peer is pinged every `ping_interval`. A two-parameter form
//! carries the target server and is forwarded until it gets there.

use slirc_wire::Line;
use slirc_wire::casemap::irc_eq;
use tracing::debug;

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::EntityStore;
use crate::sync::SyncManager;

/// Early liveness traffic is taken as the end of the peer's burst.
fn end_burst_if_early<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>) {
    if sm.connection(ctx.conn).is_some_and(|c| c.bursting) {
        debug!(conn = %ctx.conn, "liveness before ENDBURST, treating burst as finished");
        sm.end_burst(ctx.conn);
    }
}

/// `:<source> PING <origin> [<target>]`
pub(crate) fn ping<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    end_burst_if_early(sm, ctx);
    let us = sm.server_name().to_string();
    match line.params.as_slice() {
        [origin] => {
            sm.send(ctx.conn, format!(":{us} PONG {origin}"));
        }
        [origin, target, ..] if irc_eq(target, &us) => {
            let route = sm.route_of_origin(origin).unwrap_or(ctx.conn);
            sm.send(route, format!(":{us} PONG {us} {origin}"));
        }
        [origin, target, ..] => {
            sm.to_server(target, &format!(":{} PING {origin} {target}", ctx.source));
        }
        [] => {}
    }
    Ok(())
}

/// `:<source> PONG <origin> [<target>]`
pub(crate) fn pong<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    end_burst_if_early(sm, ctx);
    let us = sm.server_name().to_string();
    match line.params.as_slice() {
        [_] => sm.mark_answered(ctx.source),
        [origin, target, ..] if irc_eq(target, &us) => {
            sm.deliver_local(ctx.source, &format!("PONG {origin} {target}"));
            sm.mark_answered(origin);
        }
        [_, target, ..] => {
            sm.to_server(target, ctx.raw);
        }
        [] => {}
    }
    Ok(())
}

impl<S: EntityStore> SyncManager<S> {
    fn mark_answered(&mut self, server: &str) {
        if let Some(node) = self.topology.find_by_name(server)
            && let Some(node) = self.topology.get_mut(node)
        {
            node.ping_answered = true;
            node.missed_pings = 0;
        }
    }
}
