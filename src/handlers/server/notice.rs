//! Network-wide notices and remote `REHASH`.

use slirc_wire::Line;
use tracing::info;

use crate::error::{HandlerResult, LinkError};
use crate::handlers::Context;
use crate::store::EntityStore;
use crate::sync::{Action, SyncManager};

/// `:<source> REHASH <server mask>`
pub(crate) fn rehash<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let Some(mask) = line.param(0) else {
        return Err(LinkError::protocol("Invalid number of parameters for REHASH"));
    };
    if sm.mask_is_us(mask) {
        let sourceserv = sm.source_server(ctx.source);
        info!(source = %ctx.source, "remote rehash");
        sm.link_notice(&format!("Remote rehash initiated by {sourceserv}."));
        sm.push_action(Action::Rehash);
    }
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    Ok(())
}

/// `:<server> OPERNOTICE :<text>`
pub(crate) fn opernotice<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let Some(text) = line.param(0) else {
        return Ok(());
    };
    sm.store.oper_notice(&format!("*** From {}: {text}", ctx.source));
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    Ok(())
}

/// `:<server> MODENOTICE <modes> :<text>`
pub(crate) fn modenotice<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [modes, text] = line.params.as_slice() else {
        return Ok(());
    };
    sm.store.mode_notice(modes, &format!("*** From {}: {text}", ctx.source));
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    Ok(())
}

/// `:<server> SNONOTICE <snomask> :<text>`
pub(crate) fn snonotice<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [mask, text] = line.params.as_slice() else {
        return Ok(());
    };
    let Some(mask) = mask.chars().next() else {
        return Ok(());
    };
    sm.store.server_notice(mask, &format!("From {}: {text}", ctx.source));
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    Ok(())
}
