//! Commands without a dedicated handler.
//!
//! A user-sourced line is run through the entity store as if that user had
//! typed it, then passed on. This is how client commands the link layer
//! knows nothing about still cross the network.

use slirc_wire::Line;
use slirc_wire::casemap::irc_eq;
use tracing::{debug, info};

use crate::error::{HandlerResult, LinkError};
use crate::handlers::Context;
use crate::store::modes::parse_channel_modes;
use crate::store::{CommandOutcome, EntityStore};
use crate::sync::SyncManager;

pub(crate) fn fallback<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    if sm.is_server(ctx.source) {
        if line.command == "MODE" {
            server_mode(sm, ctx, line);
        } else {
            debug!(source = %ctx.source, command = %line.command, "server command passed on");
            sm.relay_raw(ctx, line);
        }
        return Ok(());
    }
    let Some(nick) = sm.store.user(ctx.source).map(|u| u.nick.clone()) else {
        debug!(source = %ctx.source, command = %line.command, "line from unknown source dropped");
        return Ok(());
    };

    match line.command.as_str() {
        "NICK" => {
            if let Some(new) = line.param(0)
                && !irc_eq(new, &nick)
                && sm.store.user(new).is_some()
            {
                nick_collision(sm, &nick, new);
                return Ok(());
            }
        }
        "QUIT" => {
            let reason = line.param(0).unwrap_or("Client exited");
            sm.quit_user(&nick, reason);
            sm.relay_raw(ctx, line);
            return Ok(());
        }
        _ => {}
    }

    let now = sm.now();
    match sm.store.execute_as(&nick, &line.command, &line.params, now) {
        CommandOutcome::Success => {
            sm.relay_raw(ctx, line);
            Ok(())
        }
        CommandOutcome::Failure => {
            debug!(nick = %nick, command = %line.command, "relayed command failed locally");
            Ok(())
        }
        CommandOutcome::Invalid => Err(LinkError::Protocol(format!(
            "Unrecognised command '{}' -- possibly loaded mismatched modules",
            line.command
        ))),
    }
}

/// A remote nick change onto a nick already in use removes both users.
fn nick_collision<S: EntityStore>(sm: &mut SyncManager<S>, old: &str, new: &str) {
    let us = sm.server_name().to_string();
    sm.to_all(&format!(":{us} KILL {new} :Nickname collision ({old} -> {new})"));
    sm.to_all(&format!(":{us} KILL {old} :Nickname collision"));
    sm.quit_user(new, "Nickname collision");
    sm.quit_user(old, "Nickname collision");
    info!(old = %old, new = %new, "nickname collision on nick change");
}

/// `:<server> MODE <target> <modes> [params...]`, applied without
/// timestamp checks.
fn server_mode<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) {
    let [target, modes, args @ ..] = line.params.as_slice() else {
        return;
    };
    let now = sm.now();
    let shown = std::iter::once(modes.as_str())
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    if let Some(channel) = sm.store.channel_mut(target) {
        for change in parse_channel_modes(modes, args) {
            channel.apply_mode(&change, ctx.source, now);
        }
        sm.deliver_channel(target, &format!(":{} MODE {target} {shown}", ctx.source));
    } else if let Some(user) = sm.store.user_mut(target) {
        user.apply_modes(modes);
        sm.deliver_local(target, &format!(":{} MODE {target} {shown}", ctx.source));
    } else {
        return;
    }
    sm.to_all_but(Some(ctx.conn), ctx.raw);
}
