//! REST boundary for the notification inbox.

mod client;

pub use client::{paths, HttpNotificationsApi};

use async_trait::async_trait;
use thiserror::Error;

use crate::notifications::Notification;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Session is no longer valid")]
    Unauthorized,

    #[error("Unexpected response status {0}")]
    Status(u16),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// True if the error means the credential was rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

/// Notification endpoints consumed by the sync core.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait NotificationsApi: Send + Sync {
    /// Full notification list, used for hydration.
    async fn list(&self) -> Result<Vec<Notification>, ApiError>;

    async fn mark_read(&self, id: &str) -> Result<(), ApiError>;

    async fn mark_all_read(&self) -> Result<(), ApiError>;

    async fn delete(&self, id: &str) -> Result<(), ApiError>;
}
