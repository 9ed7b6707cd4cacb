//! Extension bus.
//!
//! Modules that need their own state carried across the network implement
//! [`SyncExtension`]. They see every decoded `METADATA` line, contribute
//! key/value pairs to each burst, and hear about servers joining and
//! leaving. The link layer never interprets their payloads.

use crate::store::{Channel, User};

/// What a `METADATA` line is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataTarget<'a> {
    /// `METADATA * <key> :<value>`
    Network,
    Channel(&'a str),
    User(&'a str),
}

impl MetadataTarget<'_> {
    /// Wire form of the target parameter.
    pub fn as_param(&self) -> &str {
        match self {
            Self::Network => "*",
            Self::Channel(name) | Self::User(name) => name,
        }
    }
}

pub trait SyncExtension: Send {
    fn name(&self) -> &str;

    /// A `METADATA` line arrived from the network.
    fn on_metadata(&mut self, _target: MetadataTarget<'_>, _key: &str, _value: &str) {}

    /// Pairs to burst for one user.
    fn sync_user(&self, _user: &User) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Pairs to burst for one channel.
    fn sync_channel(&self, _channel: &Channel) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Network-wide pairs to burst.
    fn sync_network(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn on_new_server(&mut self, _name: &str) {}

    fn on_lost_server(&mut self, _name: &str) {}
}
