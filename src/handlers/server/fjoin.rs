//! Channel joins and status resets.
//!
//! `:<server> FJOIN <#chan> <ts> :[prefixes],<nick> [prefixes],<nick> ...`
//!
//! The older channel wins. When theirs is older we strip every status
//! prefix we handed out and adopt their timestamp; when ours is older their
//! members join without status. Equal timestamps merge.

use slirc_wire::Line;
use tracing::{debug, info};

use crate::error::{HandlerResult, LinkError};
use crate::handlers::Context;
use crate::store::modes::stack_modes;
use crate::store::{EntityStore, MemberStatus};
use crate::sync::SyncManager;
use crate::sync::resolve::join_outcome;

/// A channel we have never seen is treated as this far in the future, so
/// any burst for it wins.
const UNSEEN_CHANNEL_SKEW: i64 = 600;

impl<S: EntityStore> SyncManager<S> {
    /// Strip every status prefix on `chan`, telling the whole network.
    pub(crate) fn remove_status(&mut self, chan: &str) {
        let Some(channel) = self.store.channel_mut(chan) else {
            return;
        };
        let removed = channel.strip_status();
        let (name, ts) = (channel.name.clone(), channel.ts);
        if removed.is_empty() {
            return;
        }
        let us = self.config.server.name.clone();
        for modes in stack_modes(&removed, self.config.limits.maxmodes) {
            self.to_all(&format!(":{us} FMODE {name} {ts} {modes}"));
            self.deliver_channel(&name, &format!(":{us} MODE {name} {modes}"));
        }
        debug!(channel = %name, removed = removed.len(), "status removed");
    }
}

pub(crate) fn fjoin<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    if line.params.len() < 3 {
        return Ok(());
    }
    let chan = line.params[0].as_str();
    let Ok(theirs) = line.params[1].parse::<i64>() else {
        return Ok(());
    };
    let existing = sm.store.channel(chan).map(|c| c.ts);
    let ours = existing.unwrap_or_else(|| sm.now() + UNSEEN_CHANNEL_SKEW);
    let outcome = join_outcome(ours, theirs);

    if outcome.strip_ours && existing.is_some() {
        if sm.config.sync.announce_ts_change {
            let us = sm.server_name().to_string();
            sm.deliver_channel(
                chan,
                &format!(":{us} NOTICE {chan} :TS for {chan} changed from {ours} to {theirs}"),
            );
        }
        info!(channel = %chan, ours, theirs, "channel timestamp lowered");
        if let Some(channel) = sm.store.channel_mut(chan) {
            channel.ts = theirs;
        }
        sm.remove_status(chan);
    }

    sm.to_all_but(Some(ctx.conn), ctx.raw);

    let members = line.params[2..].iter().flat_map(|p| p.split_whitespace());
    for item in members {
        let (prefixes, nick) = item.split_once(',').unwrap_or(("", item));
        let status = match MemberStatus::from_prefixes(prefixes) {
            Ok(status) => status,
            Err(bad) => {
                sm.store.oper_notice(&format!(
                    "ERROR: We received a user with an unknown prefix '{bad}'. Closed connection to avoid a desync."
                ));
                return Err(LinkError::Protocol(format!("Invalid prefix '{bad}' in FJOIN")));
            }
        };
        let Some(user) = sm.store.user(nick) else {
            continue;
        };
        let (nick, hostmask) = (user.nick.clone(), user.hostmask());
        if sm.user_route(&nick) != Some(ctx.conn) {
            debug!(nick = %nick, channel = %chan, "FJOIN member not behind sender");
            continue;
        }
        let status = if outcome.grant_theirs {
            status
        } else {
            MemberStatus::default()
        };
        sm.store.create_channel(chan, theirs).add_member(&nick, status);
        sm.deliver_channel(chan, &format!(":{hostmask} JOIN :{chan}"));
    }
    Ok(())
}

/// `:<source> REMSTATUS <#chan>`
pub(crate) fn remstatus<S: EntityStore>(sm: &mut SyncManager<S>, _ctx: &Context<'_>, line: &Line) -> HandlerResult {
    if let Some(chan) = line.param(0) {
        sm.remove_status(chan);
    }
    Ok(())
}
