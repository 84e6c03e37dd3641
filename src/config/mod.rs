mod file_config;

pub use file_config::{FileConfig, HeartbeatConfig, ReconnectConfig, SessionConfig};

use crate::session::DEFAULT_AUTH_ENDPOINTS;
use anyhow::{bail, Result};

/// Path of the push endpoint relative to the API base URL.
pub const DEFAULT_PUSH_PATH: &str = "/v1/ws";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub api_base_url: Option<String>,
    pub push_url: Option<String>,
    pub token: Option<String>,
    pub request_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub api_base_url: String,
    pub push_url: String,
    pub token: String,
    pub request_timeout_sec: u64,

    // Feature configs (with defaults)
    pub reconnect: ReconnectSettings,
    pub heartbeat: HeartbeatSettings,
    pub session: SessionSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let api_base_url = file
            .api_base_url
            .or_else(|| cli.api_base_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "api_base_url must be specified via --api-base-url or in config file"
                )
            })?;
        let api_base_url = api_base_url.trim_end_matches('/').to_string();
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            bail!("api_base_url must be an http(s) URL: {}", api_base_url);
        }

        let push_url = match file.push_url.or_else(|| cli.push_url.clone()) {
            Some(url) => {
                if !url.starts_with("ws://") && !url.starts_with("wss://") {
                    bail!("push_url must be a ws(s) URL: {}", url);
                }
                url
            }
            None => derive_push_url(&api_base_url),
        };

        let token = file
            .token
            .or_else(|| cli.token.clone())
            .ok_or_else(|| anyhow::anyhow!("token must be specified via --token or in config file"))?;
        if token.trim().is_empty() {
            bail!("token must not be empty");
        }

        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);
        if request_timeout_sec == 0 {
            bail!("request_timeout_sec must be greater than zero");
        }

        // Reconnect settings - merge file config with defaults
        let defaults = ReconnectSettings::default();
        let rc_file = file.reconnect.unwrap_or_default();
        let reconnect = ReconnectSettings {
            initial_backoff_ms: rc_file
                .initial_backoff_ms
                .unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: rc_file.max_backoff_ms.unwrap_or(defaults.max_backoff_ms),
            backoff_multiplier: rc_file
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
            jitter: rc_file.jitter.unwrap_or(defaults.jitter),
        };
        if reconnect.initial_backoff_ms == 0 {
            bail!("reconnect.initial_backoff_ms must be greater than zero");
        }
        if reconnect.max_backoff_ms < reconnect.initial_backoff_ms {
            bail!(
                "reconnect.max_backoff_ms ({}) is lower than initial_backoff_ms ({})",
                reconnect.max_backoff_ms,
                reconnect.initial_backoff_ms
            );
        }
        if reconnect.backoff_multiplier < 1.0 {
            bail!("reconnect.backoff_multiplier must be at least 1.0");
        }

        let defaults = HeartbeatSettings::default();
        let hb_file = file.heartbeat.unwrap_or_default();
        let heartbeat = HeartbeatSettings {
            connect_timeout_ms: hb_file
                .connect_timeout_ms
                .unwrap_or(defaults.connect_timeout_ms),
            ping_interval_ms: hb_file.ping_interval_ms.unwrap_or(defaults.ping_interval_ms),
            idle_timeout_ms: hb_file.idle_timeout_ms.unwrap_or(defaults.idle_timeout_ms),
        };
        if heartbeat.connect_timeout_ms == 0 || heartbeat.ping_interval_ms == 0 {
            bail!("heartbeat.connect_timeout_ms and ping_interval_ms must be greater than zero");
        }
        if heartbeat.idle_timeout_ms <= heartbeat.ping_interval_ms {
            bail!(
                "heartbeat.idle_timeout_ms ({}) must be longer than ping_interval_ms ({})",
                heartbeat.idle_timeout_ms,
                heartbeat.ping_interval_ms
            );
        }

        let session = match file.session.and_then(|s| s.auth_endpoints) {
            Some(auth_endpoints) => SessionSettings { auth_endpoints },
            None => SessionSettings::default(),
        };

        Ok(Self {
            api_base_url,
            push_url,
            token,
            request_timeout_sec,
            reconnect,
            heartbeat,
            session,
        })
    }
}

/// `http(s)://host/base` -> `ws(s)://host/base/v1/ws`
fn derive_push_url(api_base_url: &str) -> String {
    let ws_base = if let Some(rest) = api_base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = api_base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        api_base_url.to_string()
    };
    format!("{}{}", ws_base, DEFAULT_PUSH_PATH)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectSettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Push connection liveness. The connection is dropped and retried when no
/// frame arrives for `idle_timeout_ms`; pings keep a healthy one busy.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatSettings {
    pub connect_timeout_ms: u64,
    pub ping_interval_ms: u64,
    pub idle_timeout_ms: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            ping_interval_ms: 25_000,
            idle_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub auth_endpoints: Vec<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auth_endpoints: DEFAULT_AUTH_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
