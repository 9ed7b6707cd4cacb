//! `:<server> ADDLINE <type> <mask> <setter> <set time> <duration> :<reason>`
//!
//! Bans are recorded straight away. Enforcing them against connected users
//! waits for the end of the sender's burst, so a large burst costs one scan.
//! A ban that has already run out is dropped here and goes no further.

use slirc_wire::Line;
use tracing::debug;

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::{EntityStore, XLine, XLineKind};
use crate::sync::SyncManager;

pub(crate) fn addline<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [kind, mask, setter, set_time, duration, reason, ..] = line.params.as_slice() else {
        return Ok(());
    };
    let sourceserv = sm.source_server(ctx.source);
    let Some(kind) = XLineKind::from_letter(kind) else {
        sm.store.server_notice(
            'x',
            &format!("WARNING: Invalid xline type '{kind}' sent by server {sourceserv}, ignored!"),
        );
        return Ok(());
    };
    let duration = duration.parse::<i64>().unwrap_or_default();
    let xline = XLine {
        kind,
        mask: mask.clone(),
        setter: setter.clone(),
        set_time: set_time.parse().unwrap_or_else(|_| sm.now()),
        duration,
        reason: reason.clone(),
    };
    if xline.is_expired(sm.now()) {
        debug!(kind = %kind, mask = %mask, "expired ADDLINE dropped");
        return Ok(());
    }

    if sm.store.add_xline(xline) {
        let command = kind.command();
        let text = if duration > 0 {
            format!("{sourceserv} Added {command} on {mask} to expire in {duration} seconds ({reason}).")
        } else {
            format!("{sourceserv} Added permanent {command} on {mask} ({reason}).")
        };
        sm.store.server_notice('x', &text);
        sm.to_all_but(Some(ctx.conn), ctx.raw);
    } else {
        debug!(kind = %kind, mask = %mask, "ADDLINE already known");
    }

    let bursting = match sm.conns.get_mut(&ctx.conn) {
        Some(peer) if peer.bursting => {
            peer.lines_pending = true;
            true
        }
        _ => false,
    };
    if !bursting {
        sm.enforce_xlines();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::store::EntityStore;
    use crate::test_support::{HUB, NOW, has_notice, link, manager, sent, sent_to, user};

    #[test]
    fn new_line_is_recorded_enforced_and_relayed() {
        let mut sm = manager();
        let a = link(&mut sm, "leaf-a", 1);
        let b = link(&mut sm, "leaf-b", 2);
        sm.add_user(user("bad", HUB));
        let raw = format!(":leaf-a ADDLINE G u@host.example oper {} 3600 :Spamming", NOW - 100);
        sm.handle_line(a, &raw);

        assert_eq!(sm.store().xlines().len(), 1);
        assert!(sm.store().user("bad").is_none());
        assert!(has_notice(
            &sm,
            "leaf-a Added GLINE on u@host.example to expire in 3600 seconds (Spamming)."
        ));
        let out = sent(&mut sm);
        assert_eq!(sent_to(&out, b), vec![raw.as_str(), ":bad QUIT :G-Lined: Spamming"]);
    }

    #[test]
    fn expired_line_is_dropped_on_arrival() {
        let mut sm = manager();
        let a = link(&mut sm, "leaf-a", 1);
        link(&mut sm, "leaf-b", 2);
        sm.add_user(user("bad", HUB));
        sm.handle_line(a, &format!(":leaf-a ADDLINE G u@host.example oper {} 60 :Old", NOW - 61));

        assert!(sm.store().xlines().is_empty());
        assert!(sm.store().user("bad").is_some());
        assert!(!sm.store().notices().any(|(_, n)| n.contains("GLINE")));
        assert!(sent(&mut sm).is_empty());
    }

    #[test]
    fn known_line_is_not_relayed_again() {
        let mut sm = manager();
        let a = link(&mut sm, "leaf-a", 1);
        link(&mut sm, "leaf-b", 2);
        let raw = ":leaf-a ADDLINE Q Chan* oper 900 0 :Reserved";
        sm.handle_line(a, raw);
        assert!(has_notice(&sm, "leaf-a Added permanent QLINE on Chan* (Reserved)."));
        sent(&mut sm);
        sm.handle_line(a, raw);
        assert!(sent(&mut sm).is_empty());
    }

    #[test]
    fn unknown_type_is_reported() {
        let mut sm = manager();
        let a = link(&mut sm, "leaf-a", 1);
        sm.handle_line(a, ":leaf-a ADDLINE X *@* oper 900 0 :what");
        assert!(sm.store().xlines().is_empty());
        assert!(has_notice(
            &sm,
            "WARNING: Invalid xline type 'X' sent by server leaf-a, ignored!"
        ));
    }

    #[test]
    fn burst_defers_enforcement() {
        let mut sm = manager();
        let a = link(&mut sm, "leaf-a", 1);
        sm.add_user(user("bad", HUB));
        sm.conns.get_mut(&a).unwrap().bursting = true;
        sm.handle_line(a, ":leaf-a ADDLINE Z 192.0.2.* oper 900 0 :proxy");
        assert!(sm.store().user("bad").is_some());
        assert!(sm.connection(a).unwrap().lines_pending);

        sm.handle_line(a, ":leaf-a ENDBURST");
        assert!(sm.store().user("bad").is_none());
    }
}
