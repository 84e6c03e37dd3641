//! Push message types.
//!
//! Every frame on the push connection is a JSON envelope
//! `{"type": ..., "payload": ...}`. Notification frames carry a
//! [`PushEvent`]; the rest are connection housekeeping. The client only
//! ever sends heartbeat pings.

use serde::Deserialize;

use crate::notifications::{EventParseError, PushEvent};

/// Server -> Client message envelope.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerMessage {
    /// Message type identifier (e.g., "connected", "notification")
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Type-specific payload (JSON value)
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Client -> Server message envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientMessage {
    pub msg_type: String,
    pub payload: serde_json::Value,
}

impl ClientMessage {
    /// Heartbeat request. The server answers with a `pong` frame.
    pub fn ping() -> Self {
        Self {
            msg_type: msg_types::PING.to_string(),
            payload: serde_json::Value::Null,
        }
    }

    /// Encode as a text frame.
    pub fn to_frame(&self) -> String {
        serde_json::json!({ "type": self.msg_type, "payload": self.payload }).to_string()
    }
}

/// System-level payloads.
pub mod system {
    use serde::Deserialize;

    /// Sent by the server once the connection is authenticated.
    #[derive(Debug, Clone, Default, Deserialize, PartialEq)]
    pub struct Connected {
        #[serde(default)]
        pub server_version: Option<String>,
    }

    /// Error reported by the server over an open connection.
    #[derive(Debug, Clone, Deserialize, PartialEq)]
    pub struct Error {
        pub code: String,
        #[serde(default)]
        pub message: String,
    }

    impl Error {
        /// The server dropped the connection because the credential is no longer valid.
        pub fn is_auth(&self) -> bool {
            matches!(self.code.as_str(), "unauthorized" | "session_expired")
        }
    }
}

/// Reserved message type constants.
pub mod msg_types {
    /// Sent by server on successful connection.
    pub const CONNECTED: &str = "connected";
    /// Client heartbeat request.
    pub const PING: &str = "ping";
    /// Server heartbeat response.
    pub const PONG: &str = "pong";
    /// Server error.
    pub const ERROR: &str = "error";
    /// A notification was created or changed.
    pub const NOTIFICATION: &str = "notification";
}

/// A decoded push frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PushFrame {
    Notification(PushEvent),
    Connected(system::Connected),
    Pong,
    Error(system::Error),
    /// A message type this client does not handle.
    Ignored(String),
}

/// Decode one text frame.
pub fn decode_frame(text: &str) -> Result<PushFrame, EventParseError> {
    let message: ServerMessage = serde_json::from_str(text)?;
    match message.msg_type.as_str() {
        msg_types::NOTIFICATION => Ok(PushFrame::Notification(PushEvent::parse(
            message.payload,
        )?)),
        msg_types::CONNECTED => {
            let connected = if message.payload.is_null() {
                system::Connected::default()
            } else {
                serde_json::from_value(message.payload)?
            };
            Ok(PushFrame::Connected(connected))
        }
        msg_types::PONG => Ok(PushFrame::Pong),
        msg_types::ERROR => Ok(PushFrame::Error(serde_json::from_value(message.payload)?)),
        _ => Ok(PushFrame::Ignored(message.msg_type)),
    }
}
