//! Inbox Sync Library
//!
//! Realtime notification sync core: the local inbox store, its push
//! connection and the session-expiry signal shared by every authenticated
//! request.

pub mod api;
pub mod config;
pub mod metrics;
pub mod notifications;
pub mod push;
pub mod session;

// Re-export commonly used types for convenience
pub use api::{ApiError, HttpNotificationsApi, NotificationsApi};
pub use notifications::{InboxStatus, Notification, NotificationService, PushEvent};
pub use push::{ConnectionManager, ConnectionState, ReconnectPolicy, WebSocketTransport};
pub use session::{Credentials, SessionExpired, SessionExpirySignal};
