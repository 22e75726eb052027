//! Command-line argument parsing for the skirmish client.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Skirmish client command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "skirmish", about = "Skirmish game client")]
pub struct CliArgs {
    /// WebSocket URL of the game server.
    #[arg(long)]
    pub server: Option<String>,

    /// Channel topic to join.
    #[arg(long)]
    pub topic: Option<String>,

    /// RON animation catalog replacing the built-in one.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Reconnection attempts after a drop (0 disables reconnecting).
    #[arg(long)]
    pub reconnect_attempts: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref url) = args.server {
            self.network.server_url = url.clone();
        }
        if let Some(ref topic) = args.topic {
            self.network.topic = topic.clone();
        }
        if let Some(ref path) = args.catalog {
            self.render.catalog_path = Some(path.clone());
        }
        if let Some(attempts) = args.reconnect_attempts {
            self.network.reconnect_attempts = attempts;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            server: Some("ws://192.168.1.1:4000/socket/websocket".to_string()),
            catalog: Some(PathBuf::from("catalog.ron")),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(
            config.network.server_url,
            "ws://192.168.1.1:4000/socket/websocket"
        );
        assert_eq!(
            config.render.catalog_path,
            Some(PathBuf::from("catalog.ron"))
        );
        // Non-overridden fields retain defaults
        assert_eq!(config.network.topic, "game:lobby");
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "skirmish",
            "--topic",
            "game:arena",
            "--reconnect-attempts",
            "0",
            "--log-level",
            "debug",
        ]);
        let mut config = Config::default();
        config.apply_cli_overrides(&args);
        assert_eq!(config.network.topic, "game:arena");
        assert_eq!(config.network.reconnect_attempts, 0);
        assert_eq!(config.debug.log_level, "debug");
    }
}
