//! `:<server> METADATA <*|#chan|nick> <key> :<value>`
//!
//! Decoded values go to the store and to every registered extension. An
//! empty value clears the key. The line always continues through the tree.

use slirc_wire::Line;

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::EntityStore;
use crate::sync::{MetadataTarget, SyncManager};

pub(crate) fn metadata<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, line: &Line) -> HandlerResult {
    if line.params.len() < 3 {
        return Ok(());
    }
    let (target, key, value) = (&line.params[0], &line.params[1], &line.params[2]);

    if sm.is_server(ctx.source) {
        sm.apply_metadata(target, key, value);
    }
    sm.to_all_but(Some(ctx.conn), ctx.raw);
    Ok(())
}

impl<S: EntityStore> SyncManager<S> {
    /// Record one metadata pair and hand it to the extensions.
    pub(crate) fn apply_metadata(&mut self, target: &str, key: &str, value: &str) {
        let decoded = if target == "*" {
            self.store.set_network_metadata(key, value);
            MetadataTarget::Network
        } else if target.starts_with('#') {
            let Some(channel) = self.store.channel_mut(target) else {
                return;
            };
            set_or_clear(&mut channel.metadata, key, value);
            MetadataTarget::Channel(target)
        } else {
            let Some(user) = self.store.user_mut(target) else {
                return;
            };
            set_or_clear(&mut user.metadata, key, value);
            MetadataTarget::User(target)
        };
        for extension in &mut self.extensions {
            extension.on_metadata(decoded, key, value);
        }
    }
}

fn set_or_clear(map: &mut std::collections::BTreeMap<String, String>, key: &str, value: &str) {
    if value.is_empty() {
        map.remove(key);
    } else {
        map.insert(key.to_string(), value.to_string());
    }
}
