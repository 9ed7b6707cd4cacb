//! Sync Module - Server-to-Server Linking.
//!
//! This module keeps the network a single spanning tree and the entity
//! store consistent across it. It handles server linking, the handshake,
//! the burst, timestamp arbitration and routing.

pub mod admin;
pub mod burst;
pub mod capab;
pub mod extension;
pub mod handshake;
pub mod link;
pub mod local;
pub mod manager;
pub mod registry;
pub mod resolve;
pub mod routing;
pub mod split;
pub mod timers;
pub mod topology;

pub use extension::{MetadataTarget, SyncExtension};
pub use link::{Action, ConnId, Direction, LinkState, PeerConnection};
pub use manager::SyncManager;
pub use registry::LinkRegistry;
pub use topology::{NodeId, ServerNode, Topology};
