//! Sockets for server links.
//!
//! - [`daemon`]: the single event loop driving the `SyncManager`
//! - [`connector`]: outbound attempts with async DNS
//! - [`tls`]: the `tls` transport hook
//! - [`throttle`]: per-address accept limits
//! - `peer`: one task per connected socket

pub mod connector;
pub mod daemon;
mod peer;
pub mod stream;
pub mod throttle;
pub mod tls;

pub use connector::{DnsResolver, Resolve};
pub use daemon::{Control, Daemon, DaemonHandle, Snapshot};
pub use stream::LinkStream;
pub use throttle::AcceptThrottle;
