//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, ListenConfig, TlsConfig)
//! - [`links`]: Server-to-server link blocks (LinkBlock)
//! - [`limits`]: Protocol limits negotiated with peers during CAPAB (LimitsConfig)
//! - [`policy`]: Link synchronization policy (SyncConfig)
//! - [`validation`]: Startup validation

mod limits;
mod links;
mod policy;
mod types;
pub mod validation;

pub use limits::LimitsConfig;
pub use links::{LinkBlock, TransportHook};
pub use policy::SyncConfig;
pub use types::{
    AdminInfo, Config, ConfigError, ListenConfig, LogFormat, LoggingConfig, ServerConfig, TlsConfig,
};
