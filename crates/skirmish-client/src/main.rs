//! Skirmish client binary.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI
//! flags. Run with `cargo run -p skirmish-client -- --server ws://host:4000/socket/websocket`.
//! Type a control id such as `spawn-soldier-button` on stdin to send a
//! command, `help` to list them, `quit` to leave.

use clap::Parser;
use skirmish_client::{App, PlatformDirs};
use skirmish_config::{CliArgs, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Resolve config directory
    let dirs = match args.config.clone() {
        Some(config_dir) => PlatformDirs::with_config_dir(config_dir),
        None => PlatformDirs::resolve()?,
    };
    if let Err(e) = dirs.create_dirs() {
        eprintln!("Failed to create {}: {e}", dirs.config_dir.display());
    }

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&dirs.config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    skirmish_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    tracing::info!(
        server = %config.network.server_url,
        topic = %config.network.topic,
        "starting skirmish client"
    );

    App::new(config)?.run().await?;
    Ok(())
}
