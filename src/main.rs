use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import modules from the library crate
use inbox_sync::api::HttpNotificationsApi;
use inbox_sync::config;
use inbox_sync::metrics;
use inbox_sync::notifications::{InboxStatus, NotificationService};
use inbox_sync::push::{ConnectionManager, Heartbeat, ReconnectPolicy, WebSocketTransport};
use inbox_sync::session::{Credentials, SessionExpirySignal};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if !path.exists() {
        return Err(format!("Config file does not exist: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Base URL of the notifications REST API.
    #[clap(long)]
    pub api_base_url: Option<String>,

    /// Push endpoint URL. Derived from the API base URL when omitted.
    #[clap(long)]
    pub push_url: Option<String>,

    /// Bearer token of the signed-in session.
    #[clap(long)]
    pub token: Option<String>,

    /// Timeout in seconds for REST requests.
    #[clap(long, default_value_t = 30)]
    pub request_timeout_sec: u64,

    /// Print the Prometheus metrics before exiting.
    #[clap(long)]
    pub print_metrics: bool,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            api_base_url: args.api_base_url.clone(),
            push_url: args.push_url.clone(),
            token: args.token.clone(),
            request_timeout_sec: args.request_timeout_sec,
        }
    }
}

fn log_status(service: &NotificationService, status: &InboxStatus) {
    let newest = service
        .notifications()
        .into_iter()
        .next()
        .map(|n| {
            let at = DateTime::from_timestamp(n.created_at, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| n.created_at.to_string());
            format!("{} \"{}\" at {}", n.notification_type.as_str(), n.title, at)
        })
        .unwrap_or_else(|| "none".to_string());

    info!(
        "Inbox: {} unread of {} ({} pending, loading: {}), newest: {}",
        status.unread_count, status.total, status.pending, status.loading, newest
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  api_base_url: {}", app_config.api_base_url);
    info!("  push_url: {}", app_config.push_url);
    info!("  request_timeout_sec: {}", app_config.request_timeout_sec);

    info!("Initializing metrics...");
    metrics::init_metrics();

    let signal = SessionExpirySignal::new(app_config.session.auth_endpoints.clone());
    let mut expired = signal.subscribe();
    let credentials = Credentials::new(app_config.token.clone(), signal.begin_session());

    let api = Arc::new(
        HttpNotificationsApi::new(
            app_config.api_base_url.clone(),
            app_config.request_timeout_sec,
            credentials.clone(),
            signal.clone(),
        )
        .context("Failed to create REST client")?,
    );
    let service = NotificationService::new(api);
    let mut status = service.subscribe();

    match service.refresh().await {
        Ok(count) => info!("Loaded {} notifications", count),
        Err(e) => warn!("Initial load failed, waiting for the push connection: {}", e),
    }

    let transport = WebSocketTransport::new(app_config.push_url.clone()).with_connect_timeout(
        Duration::from_millis(app_config.heartbeat.connect_timeout_ms),
    );
    let connection = ConnectionManager::new(
        Arc::new(transport),
        ReconnectPolicy::new(&app_config.reconnect),
        signal.clone(),
    )
    .with_heartbeat(Heartbeat::new(&app_config.heartbeat));
    // Every (re)connect triggers a refresh to recover missed events
    service.attach(&connection);
    connection.start(credentials).await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                log_status(&service, &current);
            }
            event = expired.recv() => {
                match event {
                    Ok(event) => {
                        warn!("Session expired ({:?}), sign in again", event.generation);
                        break;
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    connection.stop().await;
    signal.end_session();

    if cli_args.print_metrics {
        println!("{}", metrics::render());
    }

    Ok(())
}
