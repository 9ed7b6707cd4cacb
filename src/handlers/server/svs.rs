//! Services-forced changes: `SVSNICK` and `SVSJOIN`.
//!
//! Both travel the whole network; only the server the user is attached to
//! acts, and its ordinary local-event propagation tells everyone else.

use slirc_wire::Line;

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::EntityStore;
use crate::sync::SyncManager;

/// `:<source> SVSNICK <nick> <new nick> <ts>`
pub(crate) fn svsnick<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [nick, new, ts] = line.params.as_slice() else {
        return Ok(());
    };
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    if sm.is_local_user(nick) {
        let ts = ts.parse::<i64>().unwrap_or_else(|_| sm.now());
        if !sm.local_nick(nick, new, ts) {
            sm.local_quit(nick, "Nickname collision");
        }
    }
    Ok(())
}

/// `:<source> SVSJOIN <nick> <#chan>`
pub(crate) fn svsjoin<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [nick, chan] = line.params.as_slice() else {
        return Ok(());
    };
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    if sm.is_local_user(nick) {
        sm.local_join(nick, chan);
    }
    Ok(())
}
