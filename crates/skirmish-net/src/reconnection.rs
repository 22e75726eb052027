//! Client-side reconnection with exponential backoff.
//!
//! When the connection drops, [`ReconnectState`] computes exponentially
//! increasing delays with jitter. [`reconnect_loop`] drives the actual
//! connection attempts; rejoining the topic is left to the caller.

use std::time::Duration;

use rand::Rng;

use crate::channel::{ChannelClient, ChannelConfig, ChannelError};

/// Configuration for client-side reconnection behaviour.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt. Default: 1 s.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Maximum delay between reconnection attempts. Default: 30 s.
    pub max_delay: Duration,
    /// Maximum number of reconnection attempts before giving up. Default: 20.
    pub max_attempts: u32,
    /// Jitter factor (0.0–1.0). Applied as ±jitter to the delay. Default: 0.25.
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 20,
            jitter: 0.25,
        }
    }
}

/// Tracks reconnection attempt count and computes the next backoff delay.
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
    current_delay: Duration,
}

impl ReconnectState {
    /// Creates a new state from the given config.
    pub fn new(config: ReconnectConfig) -> Self {
        let initial = config.initial_delay;
        Self {
            config,
            attempts: 0,
            current_delay: initial,
        }
    }

    /// Computes the next delay and advances the attempt counter.
    /// Returns `None` once max attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts {
            return None;
        }

        let base = self.current_delay;
        self.attempts += 1;

        // Uniform in [base * (1 - jitter), base * (1 + jitter)].
        let jittered = if self.config.jitter > 0.0 {
            let mut rng = rand::rng();
            let factor = rng.random_range((1.0 - self.config.jitter)..=(1.0 + self.config.jitter));
            base.mul_f64(factor)
        } else {
            base
        };

        let next = self.current_delay.mul_f64(self.config.backoff_multiplier);
        self.current_delay = next.min(self.config.max_delay);

        Some(jittered.min(self.config.max_delay))
    }

    /// Resets the state after a successful reconnection.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_delay = self.config.initial_delay;
    }

    /// Number of attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Errors produced by the reconnection loop.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    /// All configured attempts were used without success.
    #[error("gave up after {attempts} reconnection attempts: {last}")]
    MaxAttemptsExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last: ChannelError,
    },

    /// `max_attempts` is zero.
    #[error("reconnection disabled")]
    Disabled,
}

/// Reconnects to `url` using exponential backoff.
///
/// The returned client is connected but has not joined any topic.
///
/// # Errors
///
/// Returns [`ReconnectError::MaxAttemptsExhausted`] with the last connect
/// error once every attempt has failed.
pub async fn reconnect_loop(
    url: &str,
    config: ReconnectConfig,
    channel_config: ChannelConfig,
) -> Result<ChannelClient, ReconnectError> {
    let mut state = ReconnectState::new(config);
    let mut last = None;

    while let Some(delay) = state.next_delay() {
        tracing::info!(attempt = state.attempts(), ?delay, "reconnecting");
        tokio::time::sleep(delay).await;

        match ChannelClient::connect(url, channel_config.clone()).await {
            Ok(client) => {
                tracing::info!(attempts = state.attempts(), "reconnected");
                return Ok(client);
            }
            Err(error) => {
                tracing::warn!(attempt = state.attempts(), %error, "reconnection attempt failed");
                last = Some(error);
            }
        }
    }

    match last {
        Some(last) => Err(ReconnectError::MaxAttemptsExhausted {
            attempts: state.attempts(),
            last,
        }),
        None => Err(ReconnectError::Disabled),
    }
}
