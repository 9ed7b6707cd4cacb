//! Clock agreement (`TIMESET`) and remote `TIME` queries.

use chrono::DateTime;
use slirc_wire::Line;
use slirc_wire::casemap::irc_eq;
use tracing::{debug, info};

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::EntityStore;
use crate::sync::SyncManager;
use crate::sync::resolve::{TimeVerdict, timeset_verdict};

/// Human-readable form of a Unix time, as returned in `391`.
pub(crate) fn time_string(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|t| t.format("%a %b %d %H:%M:%S %Y").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// `:<server> TIMESET <ts> [FORCE]`
///
/// An earlier time is adopted and passed on. A later one is answered with
/// our own time so the network converges on the lowest clock.
pub(crate) fn timeset<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    if !sm.config.sync.time_sync {
        return Ok(());
    }
    let Some(theirs) = line.param(0).and_then(|t| t.parse::<i64>().ok()) else {
        return Ok(());
    };
    let force = line.param(1) == Some("FORCE");
    let ours = sm.now();

    match timeset_verdict(ours, theirs, force) {
        TimeVerdict::Relay => sm.to_all_but(Some(ctx.conn), ctx.raw),
        TimeVerdict::Adjust(delta) => {
            let old = sm.clock.adjust(delta);
            info!(delta, old_offset = old, source = %ctx.source, "clock adjusted by TIMESET");
            sm.to_all_but(Some(ctx.conn), ctx.raw);
        }
        TimeVerdict::Correct => {
            debug!(ours, theirs, "TIMESET ahead of us, correcting");
            let us = sm.server_name().to_string();
            sm.to_all(&format!(":{us} TIMESET {ours}"));
        }
    }
    Ok(())
}

/// `:<server> TIME <target server> <nick>` asks for the time;
/// `:<server> TIME <asking server> <nick> <ts>` answers.
pub(crate) fn time<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let us = sm.server_name().to_string();
    match line.params.as_slice() {
        [target, nick] => {
            if irc_eq(target, &us) {
                if sm.store.user(nick).is_some() {
                    let now = sm.now();
                    sm.to_server(ctx.source, &format!(":{us} TIME {} {nick} {now}", ctx.source));
                }
            } else {
                sm.to_server(target, ctx.raw);
            }
        }
        [_, nick, ts] => {
            if sm.is_local_user(nick) {
                let ts = ts.parse::<i64>().unwrap_or_default();
                let text = format!(":{us} 391 {nick} {} :{}", ctx.source, time_string(ts));
                sm.deliver_local(nick, &text);
            } else {
                sm.to_user(nick, ctx.raw);
            }
        }
        _ => {}
    }
    Ok(())
}
