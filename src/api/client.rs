//! HTTP client for the notification REST endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ApiError, NotificationsApi};
use crate::notifications::Notification;
use crate::session::{Credentials, SessionExpirySignal};

pub mod paths {
    pub const NOTIFICATIONS: &str = "/v1/notifications";
    pub const READ_ALL: &str = "/v1/notifications/read-all";

    pub fn notification(id: &str) -> String {
        format!("{}/{}", NOTIFICATIONS, urlencoding::encode(id))
    }

    pub fn read(id: &str) -> String {
        format!("{}/{}/read", NOTIFICATIONS, urlencoding::encode(id))
    }
}

/// The list endpoint answers either with a bare array or wrapped in an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Wrapped { notifications: Vec<Notification> },
    Bare(Vec<Notification>),
}

impl From<ListResponse> for Vec<Notification> {
    fn from(response: ListResponse) -> Self {
        match response {
            ListResponse::Wrapped { notifications } => notifications,
            ListResponse::Bare(notifications) => notifications,
        }
    }
}

/// reqwest implementation of [`NotificationsApi`].
///
/// Every request carries the bearer credential. A 401 on any endpoint is
/// reported to the session-expiry signal before being returned.
pub struct HttpNotificationsApi {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    signal: SessionExpirySignal,
}

impl HttpNotificationsApi {
    /// # Arguments
    /// * `base_url` - Base URL of the API (e.g., "https://clinic.example.com/api")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(
        base_url: String,
        timeout_sec: u64,
        credentials: Credentials,
        signal: SessionExpirySignal,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            credentials,
            signal,
        })
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, ApiError> {
        let response = request
            .header(AUTHORIZATION, self.credentials.bearer())
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("{} answered 401", path);
            self.signal
                .report_unauthorized(self.credentials.generation, path);
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            debug!("{} answered {}", path, status);
            return Err(ApiError::Status(status.as_u16()));
        }
        Ok(response)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl NotificationsApi for HttpNotificationsApi {
    async fn list(&self) -> Result<Vec<Notification>, ApiError> {
        let path = paths::NOTIFICATIONS;
        let response = self.send(self.client.get(self.url(path)), path).await?;
        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(body.into())
    }

    async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        let path = paths::read(id);
        self.send(self.client.patch(self.url(&path)), &path).await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        let path = paths::READ_ALL;
        self.send(self.client.patch(self.url(path)), path).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let path = paths::notification(id);
        self.send(self.client.delete(self.url(&path)), &path).await?;
        Ok(())
    }
}
