//! Remote queries: `VERSION`, `MOTD`, `ADMIN`, `STATS`, `IDLE` and the
//! `PUSH` wrapper that carries numerics back to the asking user.

use slirc_wire::Line;
use tracing::debug;

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::EntityStore;
use crate::sync::SyncManager;

/// `:<server> VERSION :<version string>`
pub(crate) fn version<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let Some(text) = line.param(0) else {
        return Ok(());
    };
    if let Some(node) = sm.topology.find_by_name(ctx.source)
        && let Some(node) = sm.topology.get_mut(node)
    {
        node.version = text.to_string();
    }
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    Ok(())
}

/// Answer a query addressed to us, or pass it on toward the matching server.
/// Returns true when the query was for us.
fn for_us_or_forward<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, mask: &str) -> bool {
    if sm.mask_is_us(mask) {
        return true;
    }
    match sm.topology.find_by_mask(mask).and_then(|n| sm.topology.get(n)) {
        Some(node) => {
            let name = node.name.clone();
            sm.to_server(&name, ctx.raw);
        }
        None => debug!(mask = %mask, "query for unknown server"),
    }
    false
}

/// `:<nick> MOTD <server>`
pub(crate) fn motd<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let Some(mask) = line.param(0) else {
        return Ok(());
    };
    if for_us_or_forward(sm, ctx, mask) {
        let lines = motd_lines(sm, ctx.source);
        sm.send_numerics(ctx.source, lines);
    }
    Ok(())
}

/// `:<nick> ADMIN <server>`
pub(crate) fn admin<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let Some(mask) = line.param(0) else {
        return Ok(());
    };
    if for_us_or_forward(sm, ctx, mask) {
        let lines = admin_lines(sm, ctx.source);
        sm.send_numerics(ctx.source, lines);
    }
    Ok(())
}

/// `:<nick> STATS <letter> <server>`
pub(crate) fn stats<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [letter, mask, ..] = line.params.as_slice() else {
        return Ok(());
    };
    if for_us_or_forward(sm, ctx, mask) {
        let letter = letter.chars().next().unwrap_or('?');
        let lines = sm.stats_lines(ctx.source, letter);
        sm.send_numerics(ctx.source, lines);
    }
    Ok(())
}

pub(crate) fn motd_lines<S: EntityStore>(sm: &SyncManager<S>, nick: &str) -> Vec<String> {
    let motd = &sm.config.server.motd;
    if motd.is_empty() {
        return vec![format!("422 {nick} :Message of the day file is missing.")];
    }
    let mut out = Vec::with_capacity(motd.len() + 2);
    out.push(format!("375 {nick} :- {} Message of the Day -", sm.server_name()));
    out.extend(motd.iter().map(|line| format!("372 {nick} :- {line}")));
    out.push(format!("376 {nick} :End of message of the day."));
    out
}

pub(crate) fn admin_lines<S: EntityStore>(sm: &SyncManager<S>, nick: &str) -> Vec<String> {
    let info = &sm.config.server.admin;
    vec![
        format!("256 {nick} :Administrative info for {}", sm.server_name()),
        format!("257 {nick} :Name     - {}", info.name),
        format!("258 {nick} :Nickname - {}", info.nick),
        format!("259 {nick} :E-Mail   - {}", info.email),
    ]
}

/// `:<asker> IDLE <target>` asks; `:<target> IDLE <asker> <signon> <idle>` answers.
pub(crate) fn idle<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let Some(source) = sm.store.user(ctx.source).map(|u| u.nick.clone()) else {
        return Ok(());
    };
    match line.params.as_slice() {
        [target] => {
            if sm.is_local_user(target) {
                let Some(user) = sm.store.user(target) else {
                    return Ok(());
                };
                let idle = (sm.now() - user.idle_since).max(0);
                let reply = format!(":{} IDLE {source} {} {idle}", user.nick, user.signon);
                sm.to_user(&source, &reply);
            } else {
                sm.to_user(target, ctx.raw);
            }
        }
        [asker, signon, idle, ..] => {
            if sm.is_local_user(asker) {
                let lines = whois_lines(sm, asker, &source, signon, idle);
                sm.send_numerics(asker, lines);
            } else {
                sm.to_user(asker, ctx.raw);
            }
        }
        _ => {}
    }
    Ok(())
}

fn whois_lines<S: EntityStore>(sm: &SyncManager<S>, asker: &str, nick: &str, signon: &str, idle: &str) -> Vec<String> {
    let Some(user) = sm.store.user(nick) else {
        return Vec::new();
    };
    let description = sm
        .topology
        .find_by_name(&user.server)
        .and_then(|n| sm.topology.get(n))
        .map(|n| n.description.clone())
        .unwrap_or_default();
    vec![
        format!("311 {asker} {} {} {} * :{}", user.nick, user.ident, user.dhost, user.gecos),
        format!("312 {asker} {} {} :{description}", user.nick, user.server),
        format!("317 {asker} {} {idle} {signon} :seconds idle, signon time", user.nick),
        format!("318 {asker} {} :End of /WHOIS list.", user.nick),
    ]
}

/// `:<server> PUSH <nick> :<raw line>`
pub(crate) fn push<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [nick, text] = line.params.as_slice() else {
        return Ok(());
    };
    if !sm.deliver_local(nick, text) {
        sm.to_user(nick, ctx.raw);
    }
    Ok(())
}
