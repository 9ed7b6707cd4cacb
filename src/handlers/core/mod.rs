//! Core handler infrastructure.
//!
//! This module contains the fundamental types for line dispatch: the
//! handler context and the `(state, command)` registry.

pub mod context;
pub mod registry;

pub use context::{Context, Handler};
pub use registry::Registry;
