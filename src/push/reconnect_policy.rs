//! Reconnect policy for the push connection.
//!
//! Implements exponential backoff with configurable parameters and optional
//! jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectSettings;

/// Reconnect policy implementing exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential growth).
    pub max_backoff_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
    /// Randomize each delay within [50%, 100%] of its nominal value.
    pub jitter: bool,
}

impl ReconnectPolicy {
    /// Create a new ReconnectPolicy from configuration settings.
    pub fn new(config: &ReconnectSettings) -> Self {
        Self {
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
        }
    }

    /// Nominal backoff for the given number of consecutive failures.
    ///
    /// `initial_backoff * multiplier^failures`, capped at `max_backoff_ms`.
    pub fn backoff_ms(&self, failures: u32) -> u64 {
        let exponent = failures.min(64) as i32;
        let backoff = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        backoff.min(self.max_backoff_ms as f64) as u64
    }

    /// Delay to wait before the next attempt, jittered if enabled.
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = if self.jitter {
            rand::rng().random::<f64>()
        } else {
            1.0
        };
        self.delay_with_jitter_factor(failures, factor)
    }

    /// Delay with an explicit jitter factor in [0.0, 1.0].
    ///
    /// The factor maps to [50%, 100%] of the nominal backoff. Ignored when
    /// jitter is disabled.
    pub fn delay_with_jitter_factor(&self, failures: u32, jitter_factor: f64) -> Duration {
        let base = self.backoff_ms(failures);
        if !self.jitter {
            return Duration::from_millis(base);
        }
        let factor = jitter_factor.clamp(0.0, 1.0).mul_add(0.5, 0.5);
        Duration::from_millis((base as f64 * factor) as u64)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(&ReconnectSettings::default())
    }
}
