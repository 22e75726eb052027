//! Skirmish game client.
//!
//! Joins the game channel, mirrors every `state_update` snapshot onto a
//! headless sprite scene, and turns control input into server commands.

pub mod app;
pub mod platform;

pub use app::{App, AppError, ControlOutcome};
pub use platform::{PlatformDirs, PlatformError};
