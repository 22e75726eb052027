//! Structured logging for the skirmish client.
//!
//! Console output with uptime timestamps and module paths, plus a JSON log
//! file in debug builds. The level comes from `RUST_LOG` when set, otherwise
//! from the config's `debug.log_level`.

use std::path::Path;

use skirmish_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directives appended to every filter built from the config. The WebSocket
/// stack logs every frame at debug level.
const QUIET_DEPENDENCIES: &str = "tungstenite=warn,tokio_tungstenite=warn";

/// Name of the JSON log file written in debug builds.
pub const LOG_FILE_NAME: &str = "skirmish.log";

/// Initialize the global tracing subscriber.
///
/// # Arguments
///
/// * `log_dir` - Directory for the JSON log file (debug builds only)
/// * `debug_build` - Whether to write the JSON log file
/// * `config` - Source of the `debug.log_level` setting
///
/// # Examples
///
/// ```no_run
/// use skirmish_config::Config;
/// use skirmish_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), true, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let level = config
        .map(|config| config.debug.log_level.as_str())
        .filter(|level| !level.is_empty());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for_level(level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Builds the filter for a configured level, `info` when none is given.
pub fn filter_for_level(level: Option<&str>) -> EnvFilter {
    let level = level.unwrap_or("info");
    EnvFilter::new(format!("{level},{QUIET_DEPENDENCIES}"))
}

/// The filter used when neither `RUST_LOG` nor the config set a level.
pub fn default_env_filter() -> EnvFilter {
    filter_for_level(None)
}
