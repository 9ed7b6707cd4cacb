//! Handler context and core types.
//!
//! Handlers are plain functions over the [`SyncManager`]; the context only
//! carries what the dispatcher learned about the line before calling them.

use slirc_wire::Line;

use crate::error::HandlerResult;
use crate::store::EntityStore;
use crate::sync::{ConnId, SyncManager};

/// Handler context passed to each line handler.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    /// Connection the line arrived on.
    pub conn: ConnId,
    /// Name of the directly attached server on that connection.
    pub peer: &'a str,
    /// Origin of the line: a nick or a server name. The peer itself when
    /// the line carried no origin.
    pub source: &'a str,
    /// The line as received, origin included, ready to relay unchanged.
    pub raw: &'a str,
}

/// A line handler. An `Err` closes the link it arrived on.
pub type Handler<S> = fn(&mut SyncManager<S>, &Context<'_>, &Line) -> HandlerResult;

impl<S: EntityStore> SyncManager<S> {
    /// Server a source belongs to: the user's server, or the source itself.
    pub(crate) fn source_server(&self, source: &str) -> String {
        self.store
            .user(source)
            .map(|u| u.server.clone())
            .unwrap_or_else(|| source.to_string())
    }
}
