//! Push transport abstraction and its WebSocket implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::session::Credentials;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Push endpoint rejected the credential")]
    Unauthorized,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection lost: {0}")]
    Io(String),
}

impl TransportError {
    pub fn is_auth(&self) -> bool {
        matches!(self, TransportError::Unauthorized)
    }
}

/// Opens authenticated push connections.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Endpoint reported to the session-expiry signal on auth rejection.
    fn endpoint(&self) -> &str;

    async fn connect(&self, credentials: &Credentials)
        -> Result<Box<dyn PushStream>, TransportError>;
}

/// One open push connection.
#[async_trait]
pub trait PushStream: Send {
    /// Next text frame. `None` once the server closed the connection.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self);
}

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket push transport. The bearer credential is sent in the
/// `Authorization` header of the upgrade request.
pub struct WebSocketTransport {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bound on TCP connect plus the upgrade handshake.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn PushStream>, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let bearer = HeaderValue::from_str(&credentials.bearer())
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let connected = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                TransportError::Connect(format!(
                    "no handshake response within {:?}",
                    self.connect_timeout
                ))
            })?;

        match connected {
            Ok((stream, _)) => {
                debug!("WebSocket connected to {}", self.url);
                Ok(Box::new(WebSocketConnection {
                    inner: stream,
                    closed: false,
                }))
            }
            Err(WsError::Http(response)) if response.status() == StatusCode::UNAUTHORIZED => {
                Err(TransportError::Unauthorized)
            }
            Err(e) => Err(TransportError::Connect(e.to_string())),
        }
    }
}

struct WebSocketConnection {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl PushStream for WebSocketConnection {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.close(None).await {
            debug!("Error while closing WebSocket: {}", e);
        }
    }
}
