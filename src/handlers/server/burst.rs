//! End of a peer's burst.

use slirc_wire::Line;
use tracing::info;

use crate::error::HandlerResult;
use crate::handlers::Context;
use crate::store::EntityStore;
use crate::sync::{ConnId, SyncManager};

impl<S: EntityStore> SyncManager<S> {
    /// The peer on `conn` has sent everything it knows.
    pub(crate) fn end_burst(&mut self, conn: ConnId) {
        let Some(peer) = self.conns.get_mut(&conn) else {
            return;
        };
        peer.bursting = false;
        let pending = std::mem::take(&mut peer.lines_pending);
        let name = peer.label();
        if pending {
            self.enforce_xlines();
        }
        info!(peer = %name, "burst received");
        self.link_notice(&format!("Received end of netburst from {name}"));
    }

    /// Apply every recorded ban to local users, telling the network about
    /// each user removed.
    pub(crate) fn enforce_xlines(&mut self) {
        let now = self.now();
        let hits = self.store.apply_xlines(now);
        let us = self.config.server.name.clone();
        for (nick, reason) in hits {
            self.count_user(&us, -1);
            self.to_all(&format!(":{nick} QUIT :{reason}"));
        }
    }
}

/// `:<server> ENDBURST`
pub(crate) fn endburst<S: EntityStore>(sm: &mut SyncManager<S>, ctx: &Context<'_>, _line: &Line) -> HandlerResult {
    sm.end_burst(ctx.conn);
    Ok(())
}
