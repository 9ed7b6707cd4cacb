//! `:<server> KICK <#chan> <nick> :<reason>`
//!
//! A kick from a user is an ordinary relayed command; only server-sourced
//! kicks (services, remote enforcement) land here.

use slirc_wire::Line;

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::EntityStore;
use crate::sync::SyncManager;

pub(crate) fn kick<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    if !sm.is_server(ctx.source) {
        return super::routing::fallback(sm, ctx, line);
    }
    let [chan, nick, reason] = line.params.as_slice() else {
        return Ok(());
    };
    let member = sm
        .store
        .channel(chan)
        .and_then(|c| c.member(nick))
        .map(|m| m.nick.clone());
    if let Some(nick) = member {
        sm.deliver_channel(chan, &format!(":{} KICK {chan} {nick} :{reason}", ctx.source));
        sm.store.part(chan, &nick);
    }
    sm.relay_raw(ctx, line);
    Ok(())
}
