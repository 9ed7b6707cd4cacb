//! slircd-link - spanning-tree server linking for the Straylight IRC daemon.
//!
//! The link layer keeps every server in one loop-free tree and every
//! server's view of users, channels and bans in agreement. The
//! [`SyncManager`](sync::SyncManager) holds all link state and is driven by
//! the [`Daemon`](network::Daemon) event loop; the entity store it keeps in
//! step is supplied by the embedding server through [`store::EntityStore`].

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod network;
pub mod store;
pub mod sync;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::NetClock;
pub use config::Config;
pub use error::{HandlerResult, LinkError, TransportError};
pub use network::{Daemon, DaemonHandle};
pub use store::{EntityStore, MemoryStore};
pub use sync::{SyncExtension, SyncManager};
