//! Configuration structs with sensible defaults and RON persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Server connection settings.
    pub network: NetworkConfig,
    /// Scene and animation settings.
    pub render: RenderConfig,
    /// UI control bindings.
    pub input: InputConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Server connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// WebSocket endpoint of the game server.
    pub server_url: String,
    /// Channel topic to join.
    pub topic: String,
    /// Seconds between heartbeats.
    pub heartbeat_interval_secs: u64,
    /// Seconds of server silence before the connection is considered lost.
    pub heartbeat_timeout_secs: u64,
    /// Seconds to wait for a join reply.
    pub join_timeout_secs: u64,
    /// Reconnection attempts after a drop (0 disables reconnecting).
    pub reconnect_attempts: u32,
    /// Delay before the first reconnection attempt, in milliseconds.
    pub reconnect_initial_delay_ms: u64,
    /// Upper bound on the delay between attempts, in seconds.
    pub reconnect_max_delay_secs: u64,
}

impl NetworkConfig {
    /// Heartbeat period. Zero is treated as 1 s.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Heartbeat silence limit. Zero is treated as 1 s.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }

    /// Join reply deadline.
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    /// First reconnection delay.
    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_delay_ms)
    }

    /// Reconnection delay cap.
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs)
    }
}

/// Scene and animation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// RON animation catalog to load instead of the built-in one.
    pub catalog_path: Option<PathBuf>,
    /// Animation clock rate in Hz.
    pub tick_rate_hz: u32,
}

/// UI control configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Extra spawn controls (control id -> unit type), on top of the
    /// built-in `spawn-<kind>-button` bindings.
    pub spawn_bindings: BTreeMap<String, String>,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Print a line per applied snapshot.
    pub trace_snapshots: bool,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:4000/socket/websocket".to_string(),
            topic: "game:lobby".to_string(),
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            join_timeout_secs: 10,
            reconnect_attempts: 20,
            reconnect_initial_delay_ms: 1000,
            reconnect_max_delay_secs: 30,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            tick_rate_hz: 60,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            trace_snapshots: false,
        }
    }
}

// --- Load / Save ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let config = Self::load(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Load config from a specific file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })?;
        Ok(())
    }
}
