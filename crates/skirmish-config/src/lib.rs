//! Configuration for the skirmish client.
//!
//! Provides runtime-configurable settings that persist to disk as RON files.
//! Supports CLI overrides via clap and forward/backward
//! compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, InputConfig, NetworkConfig, RenderConfig};
pub use error::ConfigError;
