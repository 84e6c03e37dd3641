//! Test server lifecycle management
//!
//! An in-process stand-in for the notifications backend: the REST endpoints
//! consumed by `HttpNotificationsApi` and a `/v1/ws` push endpoint. Tests
//! drive it directly to push frames, drop connections, revoke the token or
//! make the next request on a route fail.

use super::constants::*;
use super::fixtures::{notification_frame, seed_notifications};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use inbox_sync::notifications::Notification;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

/// Route names used for request counting and forced failures
pub mod routes {
    pub const LIST: &str = "list";
    pub const MARK_READ: &str = "mark_read";
    pub const MARK_ALL_READ: &str = "mark_all_read";
    pub const DELETE: &str = "delete";
}

struct ServerState {
    notifications: Mutex<Vec<Notification>>,
    valid_token: Mutex<String>,
    forced_status: Mutex<HashMap<&'static str, StatusCode>>,
    request_counts: Mutex<HashMap<&'static str, usize>>,
    /// While true, mutation requests wait before being processed
    hold: watch::Sender<bool>,
    frames: broadcast::Sender<String>,
    kick: broadcast::Sender<()>,
    ws_clients: AtomicUsize,
    ws_handshakes: AtomicUsize,
    pings: AtomicUsize,
    /// While true, pings go unanswered
    mute: std::sync::atomic::AtomicBool,
}

impl ServerState {
    fn authorize(&self, headers: &HeaderMap) -> Result<(), StatusCode> {
        let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
        match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            Some(value) if value == expected => Ok(()),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }

    fn count(&self, route: &'static str) {
        *self.request_counts.lock().unwrap().entry(route).or_insert(0) += 1;
    }

    fn forced(&self, route: &'static str) -> Result<(), StatusCode> {
        match self.forced_status.lock().unwrap().remove(route) {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    /// Common request admission for mutation routes
    async fn admit_mutation(
        &self,
        route: &'static str,
        headers: &HeaderMap,
    ) -> Result<(), StatusCode> {
        self.count(route);
        self.authorize(headers)?;
        let mut held = self.hold.subscribe();
        let _ = held.wait_for(|held| !*held).await;
        self.forced(route)
    }
}

type SharedState = Arc<ServerState>;

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_notifications(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state.count(routes::LIST);
    state.authorize(&headers)?;
    state.forced(routes::LIST)?;
    let notifications = state.notifications.lock().unwrap().clone();
    Ok(Json(json!({ "notifications": notifications })))
}

async fn mark_read(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if let Err(status) = state.admit_mutation(routes::MARK_READ, &headers).await {
        return status;
    }
    let mut notifications = state.notifications.lock().unwrap();
    match notifications.iter_mut().find(|n| n.id == id) {
        Some(n) => {
            n.is_read = true;
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn mark_all_read(State(state): State<SharedState>, headers: HeaderMap) -> StatusCode {
    if let Err(status) = state.admit_mutation(routes::MARK_ALL_READ, &headers).await {
        return status;
    }
    for n in state.notifications.lock().unwrap().iter_mut() {
        n.is_read = true;
    }
    StatusCode::NO_CONTENT
}

async fn delete_notification(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    if let Err(status) = state.admit_mutation(routes::DELETE, &headers).await {
        return status;
    }
    let mut notifications = state.notifications.lock().unwrap();
    let before = notifications.len();
    notifications.retain(|n| n.id != id);
    if notifications.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    state.ws_handshakes.fetch_add(1, Ordering::SeqCst);
    if let Err(status) = state.authorize(&headers) {
        return status.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: SharedState) {
    let mut frames = state.frames.subscribe();
    let mut kick = state.kick.subscribe();
    state.ws_clients.fetch_add(1, Ordering::SeqCst);

    let hello = json!({ "type": "connected", "payload": { "server_version": "test" } });
    if socket
        .send(Message::Text(hello.to_string().into()))
        .await
        .is_ok()
    {
        loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Ok(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
                _ = kick.recv() => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(Message::Text(text))) if is_ping(text.as_str()) => {
                        state.pings.fetch_add(1, Ordering::SeqCst);
                        if state.mute.load(Ordering::SeqCst) {
                            continue;
                        }
                        let pong = json!({ "type": "pong", "payload": null });
                        if socket.send(Message::Text(pong.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    state.ws_clients.fetch_sub(1, Ordering::SeqCst);
}

fn is_ping(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .map(|v| v["type"] == "ping")
        .unwrap_or(false)
}

/// Test server instance with its own notification list
///
/// When dropped, the server gracefully shuts down.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// Push endpoint (e.g., "ws://127.0.0.1:12345/v1/ws")
    pub push_url: String,

    state: SharedState,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port, seeded with
    /// [`seed_notifications`].
    pub async fn spawn() -> Self {
        Self::spawn_with(seed_notifications()).await
    }

    pub async fn spawn_with(notifications: Vec<Notification>) -> Self {
        let (hold, _) = watch::channel(false);
        let (frames, _) = broadcast::channel(64);
        let (kick, _) = broadcast::channel(4);
        let state = Arc::new(ServerState {
            notifications: Mutex::new(notifications),
            valid_token: Mutex::new(TEST_TOKEN.to_string()),
            forced_status: Mutex::new(HashMap::new()),
            request_counts: Mutex::new(HashMap::new()),
            hold,
            frames,
            kick,
            ws_clients: AtomicUsize::new(0),
            ws_handshakes: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            mute: std::sync::atomic::AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/health", get(health))
            .route("/v1/notifications", get(list_notifications))
            .route("/v1/notifications/read-all", patch(mark_all_read))
            .route("/v1/notifications/{id}", delete(delete_notification))
            .route("/v1/notifications/{id}/read", patch(mark_read))
            .route("/v1/ws", get(ws_handler))
            .with_state(state.clone());

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        // Spawn server in background task with graceful shutdown
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            push_url: format!("ws://127.0.0.1:{}/v1/ws", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the /health endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// Server-side copy of a notification
    pub fn notification(&self, id: &str) -> Option<Notification> {
        self.state
            .notifications
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    /// Add a notification to the list without pushing it
    pub fn insert(&self, notification: Notification) {
        self.state.notifications.lock().unwrap().push(notification);
    }

    /// Add a notification to the list and push it to connected clients
    pub fn publish(&self, notification: Notification) {
        let frame = notification_frame(&notification);
        self.insert(notification);
        self.push_frame(frame);
    }

    /// Push a raw text frame to every connected client
    pub fn push_frame(&self, frame: impl Into<String>) {
        let _ = self.state.frames.send(frame.into());
    }

    /// Close every open push connection from the server side
    pub fn drop_connections(&self) {
        let _ = self.state.kick.send(());
    }

    /// Reject the current token on every endpoint from now on
    pub fn revoke_token(&self) {
        *self.state.valid_token.lock().unwrap() = "revoked".to_string();
    }

    /// Make the next request on `route` answer `status`
    pub fn fail_next(&self, route: &'static str, status: StatusCode) {
        self.state.forced_status.lock().unwrap().insert(route, status);
    }

    /// Park mutation requests until [`TestServer::release_mutations`]
    pub fn hold_mutations(&self) {
        self.state.hold.send_replace(true);
    }

    pub fn release_mutations(&self) {
        self.state.hold.send_replace(false);
    }

    pub fn request_count(&self, route: &str) -> usize {
        *self
            .state
            .request_counts
            .lock()
            .unwrap()
            .get(route)
            .unwrap_or(&0)
    }

    /// Number of push connections currently open
    pub fn ws_clients(&self) -> usize {
        self.state.ws_clients.load(Ordering::SeqCst)
    }

    /// Number of heartbeat pings received
    pub fn pings(&self) -> usize {
        self.state.pings.load(Ordering::SeqCst)
    }

    /// Stop answering pings while keeping sockets open, like a peer that
    /// vanished without closing.
    pub fn go_silent(&self) {
        self.state.mute.store(true, Ordering::SeqCst);
    }

    /// Number of push handshakes attempted, accepted or not
    pub fn ws_handshakes(&self) -> usize {
        self.state.ws_handshakes.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
