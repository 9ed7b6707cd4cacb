//! `:<source> FTOPIC <#chan> <set time> <setter> :<text>`

use slirc_wire::Line;

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::{EntityStore, Topic};
use crate::sync::SyncManager;
use crate::sync::resolve::topic_wins;

pub(crate) fn ftopic<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    let [chan, ts, setter, text] = line.params.as_slice() else {
        return Ok(());
    };
    let Ok(ts) = ts.parse::<i64>() else {
        return Ok(());
    };
    let Some(channel) = sm.store.channel_mut(chan) else {
        return Ok(());
    };
    if !topic_wins(channel.topic.as_ref(), ts) {
        return Ok(());
    }
    let changed = channel.topic.as_ref().map(|t| t.text.as_str()).unwrap_or_default() != text.as_str();
    channel.topic = Some(Topic {
        text: text.clone(),
        setter: setter.clone(),
        set_time: ts,
    });
    if changed {
        let shown = sm
            .store
            .user(ctx.source)
            .map(|u| u.hostmask())
            .unwrap_or_else(|| ctx.source.to_string());
        sm.deliver_channel(chan, &format!(":{shown} TOPIC {chan} :{text}"));
        sm.to_all_but(Some(ctx.conn), ctx.raw);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::store::{EntityStore, Topic};
    use crate::test_support::{link, manager, sent, sent_to};

    #[test]
    fn newer_topic_replaces_and_relays() {
        let mut sm = manager();
        let a = link(&mut sm, "leaf-a", 1);
        let b = link(&mut sm, "leaf-b", 2);
        sm.store_mut().create_channel("#rust", 10).topic = Some(Topic {
            text: "old".into(),
            setter: "x".into(),
            set_time: 100,
        });

        sm.handle_line(a, ":leaf-a FTOPIC #rust 150 alice :new topic");
        let topic = sm.store().channel("#rust").unwrap().topic.clone().unwrap();
        assert_eq!(topic.text, "new topic");
        assert_eq!(topic.setter, "alice");
        let out = sent(&mut sm);
        assert_eq!(sent_to(&out, b), vec![":leaf-a FTOPIC #rust 150 alice :new topic"]);
    }

    #[test]
    fn older_topic_loses() {
        let mut sm = manager();
        let a = link(&mut sm, "leaf-a", 1);
        link(&mut sm, "leaf-b", 2);
        sm.store_mut().create_channel("#rust", 10).topic = Some(Topic {
            text: "kept".into(),
            setter: "x".into(),
            set_time: 100,
        });
        sm.handle_line(a, ":leaf-a FTOPIC #rust 50 alice :stale");
        assert_eq!(sm.store().channel("#rust").unwrap().topic.as_ref().unwrap().text, "kept");
        assert!(sent(&mut sm).is_empty());
    }

    #[test]
    fn unchanged_text_is_not_relayed() {
        let mut sm = manager();
        let a = link(&mut sm, "leaf-a", 1);
        link(&mut sm, "leaf-b", 2);
        sm.store_mut().create_channel("#rust", 10);
        sm.handle_line(a, ":leaf-a FTOPIC #rust 150 alice :same");
        sent(&mut sm);
        sm.handle_line(a, ":leaf-a FTOPIC #rust 160 bob :same");
        assert!(sent(&mut sm).is_empty());
        assert_eq!(sm.store().channel("#rust").unwrap().topic.as_ref().unwrap().setter, "bob");
    }
}
