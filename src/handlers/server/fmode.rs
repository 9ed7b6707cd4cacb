//! Timestamped mode changes.
//!
//! `:<source> FMODE <target> <ts> <modes> [params...]`

use slirc_wire::Line;
use tracing::{debug, warn};

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::EntityStore;
use crate::store::modes::{parse_channel_modes, parse_user_modes, stack_modes};
use crate::sync::SyncManager;
use crate::sync::resolve::{ModeResolution, resolve_modes};

pub(crate) fn fmode<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    if line.params.len() < 3 {
        return Ok(());
    }
    let target = line.params[0].as_str();
    let Ok(theirs) = line.params[1].parse::<i64>() else {
        return Ok(());
    };
    let modes = line.params[2].as_str();
    let args = &line.params[3..];

    let sourceserv = sm.source_server(ctx.source);
    let trusted = sm.config.sync.trusted_bypass_ts && sm.config.sync.is_trusted(&sourceserv);
    let now = sm.now();

    let (ours, resolution) = if let Some(channel) = sm.store.channel(target) {
        let ours = channel.ts;
        let resolution = resolve_modes(channel, ours, theirs, parse_channel_modes(modes, args), trusted);
        if let Some(channel) = sm.store.channel_mut(target) {
            for change in &resolution.accepted {
                channel.apply_mode(change, ctx.source, now);
            }
        }
        (ours, resolution)
    } else if let Some(user) = sm.store.user(target) {
        let ours = user.age;
        let resolution = resolve_modes(user, ours, theirs, parse_user_modes(modes), trusted);
        if let Some(user) = sm.store.user_mut(target) {
            for change in &resolution.accepted {
                if change.adding {
                    user.modes.insert(change.letter);
                } else {
                    user.modes.remove(&change.letter);
                }
            }
        }
        (ours, resolution)
    } else {
        debug!(target = %target, "FMODE for unknown target");
        return Ok(());
    };

    if resolution.trusted_override {
        warn!(server = %sourceserv, target = %target, "trusted server overrode a newer timestamp");
        sm.store.oper_notice(&format!(
            "WARNING! U-Lined server '{sourceserv}' has bad TS for '{target}' (accepted change): SYNC YOUR CLOCKS to avoid this notice"
        ));
    }

    send_outcome(sm, ctx, target, ours, theirs, &resolution);
    Ok(())
}

/// Relay what was accepted and restate what was refused.
fn send_outcome<S: EntityStore>(
    sm: &mut SyncManager<S>,
    ctx: &Context<'_>,
    target: &str,
    ours: i64,
    theirs: i64,
    resolution: &ModeResolution,
) {
    let maxmodes = sm.config.limits.maxmodes;
    let us = sm.server_name().to_string();

    // The source sits behind the sending link, so bounces go straight back.
    for modes in stack_modes(&resolution.bounced, maxmodes) {
        sm.send(ctx.conn, format!(":{us} FMODE {target} {ours} {modes}"));
    }
    if resolution.rejected {
        debug!(target = %target, ours, theirs, "FMODE refused, newer timestamp");
    }

    let is_channel = sm.store.channel(target).is_some();
    for modes in stack_modes(&resolution.accepted, maxmodes) {
        sm.to_all_but(
            Some(ctx.conn),
            &format!(":{} FMODE {target} {theirs} {modes}", ctx.source),
        );
        let line = format!(":{} MODE {target} {modes}", ctx.source);
        if is_channel {
            sm.deliver_channel(target, &line);
        } else {
            sm.deliver_local(target, &line);
        }
    }
}
