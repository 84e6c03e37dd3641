//! Client-side wiring under test
//!
//! Builds the full sync stack (REST client, notification service, push
//! connection) against a [`TestServer`], the same way `main.rs` does.

use super::constants::*;
use super::server::{routes, TestServer};
use inbox_sync::api::HttpNotificationsApi;
use inbox_sync::notifications::{InboxStatus, NotificationService};
use inbox_sync::push::{
    ConnectionManager, ConnectionState, Heartbeat, ReconnectPolicy, WebSocketTransport,
};
use inbox_sync::session::{Credentials, SessionExpirySignal, DEFAULT_AUTH_ENDPOINTS};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub struct TestClient {
    pub signal: SessionExpirySignal,
    pub credentials: Credentials,
    pub api: Arc<HttpNotificationsApi>,
    pub service: NotificationService,
    pub connection: ConnectionManager,
}

impl TestClient {
    /// Build the stack without connecting.
    pub fn new(server: &TestServer, token: &str) -> Self {
        Self::with_heartbeat(server, token, Heartbeat::default())
    }

    pub fn with_heartbeat(server: &TestServer, token: &str, heartbeat: Heartbeat) -> Self {
        let signal =
            SessionExpirySignal::new(DEFAULT_AUTH_ENDPOINTS.iter().map(|s| s.to_string()).collect());
        let credentials = Credentials::new(token, signal.begin_session());

        let api = Arc::new(
            HttpNotificationsApi::new(
                server.base_url.clone(),
                5,
                credentials.clone(),
                signal.clone(),
            )
            .expect("Failed to build REST client"),
        );
        let service = NotificationService::new(api.clone());

        let policy = ReconnectPolicy {
            initial_backoff_ms: 20,
            max_backoff_ms: 200,
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let connection = ConnectionManager::new(
            Arc::new(WebSocketTransport::new(server.push_url.clone())),
            policy,
            signal.clone(),
        )
        .with_heartbeat(heartbeat);
        service.attach(&connection);

        Self {
            signal,
            credentials,
            api,
            service,
            connection,
        }
    }

    /// Connect with the valid test token and wait for the first hydration.
    pub async fn connect(server: &TestServer) -> Self {
        let client = Self::new(server, TEST_TOKEN);
        client.start(server).await;
        client
    }

    /// Start the push connection and wait until the refresh it triggers
    /// has landed.
    pub async fn start(&self, server: &TestServer) {
        let lists_before = server.request_count(routes::LIST);
        self.connection.start(self.credentials.clone()).await;
        self.wait_for_state(ConnectionState::Connected).await;
        // The server subscribes the socket to its frame feed after the handshake
        wait_until(|| server.ws_clients() > 0).await;
        wait_until(|| server.request_count(routes::LIST) > lists_before).await;
        self.wait_for_status(|s| !s.loading).await;
    }

    pub async fn wait_for_state(&self, expected: ConnectionState) {
        let mut state = self.connection.subscribe_state();
        timeout(
            Duration::from_millis(WAIT_TIMEOUT_MS),
            state.wait_for(|s| *s == expected),
        )
        .await
        .unwrap_or_else(|_| panic!("Timed out waiting for {:?}", expected))
        .expect("State channel closed");
    }

    pub async fn wait_for_status(&self, predicate: impl FnMut(&InboxStatus) -> bool) -> InboxStatus {
        let mut status = self.service.subscribe();
        let result = timeout(
            Duration::from_millis(WAIT_TIMEOUT_MS),
            status.wait_for(predicate),
        )
        .await
        .expect("Timed out waiting for inbox status")
        .expect("Status channel closed");
        *result
    }

    /// Wait until the store holds notification `id`.
    pub async fn wait_for_notification(&self, id: &str) {
        wait_until(|| self.service.get(id).is_some()).await;
    }

    pub fn ids(&self) -> Vec<String> {
        self.service
            .notifications()
            .into_iter()
            .map(|n| n.id)
            .collect()
    }
}

/// Poll `condition` until it holds, panicking after [`WAIT_TIMEOUT_MS`].
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let start = std::time::Instant::now();
    while !condition() {
        if start.elapsed() > Duration::from_millis(WAIT_TIMEOUT_MS) {
            panic!("Condition not met within {}ms", WAIT_TIMEOUT_MS);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
