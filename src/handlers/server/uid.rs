//! User introduction and attribute changes.
//!
//! `:<server> NICK <age> <nick> <host> <dhost> <ident> <+modes> <ip> :<gecos>`
//! introduces a client. `OPERTYPE`, `FHOST` and `FNAME` update one.

use slirc_wire::Line;
use tracing::{debug, info};

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::{EntityStore, User};
use crate::sync::SyncManager;

/// Parameters in a client introduction.
const INTRO_PARAMS: usize = 8;

/// `NICK`: an introduction from a server, otherwise a nick change.
pub(crate) fn nick<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    if line.params.len() < INTRO_PARAMS {
        return super::routing::fallback(sm, ctx, line);
    }
    let us = sm.server_name().to_string();
    let nick = line.params[1].as_str();

    if line.params.len() > INTRO_PARAMS {
        sm.send(ctx.conn, format!(":{us} KILL {nick} :Invalid client introduction ({nick}?)"));
        return Ok(());
    }

    if sm.store.user(nick).is_some() {
        // Both copies go.
        let kill = format!(":{us} KILL {nick} :Nickname collision");
        sm.send(ctx.conn, kill.clone());
        sm.to_all_but(Some(ctx.conn), &kill);
        sm.quit_user(nick, "Nickname collision");
        info!(nick = %nick, server = %ctx.source, "nickname collision on introduction");
        return Ok(());
    }

    let p = &line.params;
    let age = p[0].parse::<i64>().unwrap_or_else(|_| sm.now());
    let mut user = User {
        nick: nick.to_string(),
        ident: p[4].clone(),
        host: p[2].clone(),
        dhost: p[3].clone(),
        ip: p[6].clone(),
        gecos: p[7].clone(),
        age,
        signon: age,
        idle_since: sm.now(),
        server: ctx.source.to_string(),
        modes: Default::default(),
        oper_type: None,
        away: None,
        metadata: Default::default(),
    };
    user.apply_modes(&p[5]);

    sm.store.server_notice(
        'C',
        &format!(
            "Client connecting at {}: {}!{}@{} [{}]",
            user.server, user.nick, user.ident, user.host, user.ip
        ),
    );
    debug!(nick = %nick, server = %ctx.source, "remote client introduced");
    sm.add_user(user);
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    Ok(())
}

/// `:<nick> OPERTYPE <type>`. Underscores in the type read as spaces.
pub(crate) fn opertype<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [oper_type] = line.params.as_slice() else {
        return Ok(());
    };
    let Some(user) = sm.store.user_mut(ctx.source) else {
        return Ok(());
    };
    user.modes.insert('o');
    user.oper_type = Some(oper_type.clone());
    let text = format!(
        "From {}: User {} ({}@{}) is now an IRC operator of type {}",
        user.server,
        user.nick,
        user.ident,
        user.host,
        oper_type.replace('_', " ")
    );
    sm.store.server_notice('o', &text);
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    Ok(())
}

/// `:<nick> FHOST <displayed host>`
pub(crate) fn fhost<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let Some(host) = line.param(0) else {
        return Ok(());
    };
    let Some(user) = sm.store.user_mut(ctx.source) else {
        return Ok(());
    };
    user.dhost = host.to_string();
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    Ok(())
}

/// `:<nick> FNAME :<gecos>`
pub(crate) fn fname<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let Some(gecos) = line.param(0) else {
        return Ok(());
    };
    let Some(user) = sm.store.user_mut(ctx.source) else {
        return Ok(());
    };
    user.gecos = gecos.to_string();
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    Ok(())
}
