//! Liveness checks for an open push connection.

use std::time::Duration;

use crate::config::HeartbeatSettings;

/// The manager sends a ping every `ping_interval` and drops the connection
/// when nothing at all arrives for `idle_timeout`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

impl Heartbeat {
    pub fn new(config: &HeartbeatSettings) -> Self {
        Self {
            ping_interval: Duration::from_millis(config.ping_interval_ms),
            idle_timeout: Duration::from_millis(config.idle_timeout_ms),
        }
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new(&HeartbeatSettings::default())
    }
}
