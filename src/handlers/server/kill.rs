//! Remote KILL.

use slirc_wire::Line;
use tracing::info;

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::EntityStore;
use crate::sync::SyncManager;

/// `:<source> KILL <nick> :<reason>`
///
/// The reason gains a `[server] Killed (...)` wrapper the first time it
/// crosses a link, so every server quits the user with the same text.
pub(crate) fn kill<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [target, reason] = line.params.as_slice() else {
        return Ok(());
    };
    let Some(nick) = sm.store.user(target).map(|u| u.nick.clone()) else {
        return Ok(());
    };
    let sourceserv = sm.source_server(ctx.source);
    let reason = if reason.starts_with('[') {
        reason.clone()
    } else {
        format!("[{sourceserv}] Killed ({reason})")
    };

    sm.to_all_but(Some(ctx.conn), &format!(":{} KILL {nick} :{reason}", ctx.source));
    sm.deliver_local(
        &nick,
        &format!(":{sourceserv} KILL {nick} :{sourceserv} ({reason})"),
    );
    info!(nick = %nick, source = %ctx.source, reason = %reason, "remote kill");
    sm.quit_user(&nick, &reason);
    Ok(())
}
