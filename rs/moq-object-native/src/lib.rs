//! Helpers for native applications built on [moq_object].
//!
//! - [Log] installs a [tracing] subscriber, writing to stderr.
//! - [Config] loads every tunable from CLI flags, environment variables or a TOML file.

mod config;
mod log;

pub use config::*;
pub use log::*;

// Re-export the core crate.
pub use moq_object;
