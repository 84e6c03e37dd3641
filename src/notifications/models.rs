//! Notification data models

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Notification type.
///
/// Serialized as a plain snake_case string. Types introduced by the server
/// after this client was built land in [`NotificationType::Other`] instead of
/// failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    NewMessage,
    NewAppointment,
    AppointmentConfirmed,
    AppointmentRejected,
    AppointmentReminder,
    PrescriptionCreated,
    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::NewMessage => "new_message",
            NotificationType::NewAppointment => "new_appointment",
            NotificationType::AppointmentConfirmed => "appointment_confirmed",
            NotificationType::AppointmentRejected => "appointment_rejected",
            NotificationType::AppointmentReminder => "appointment_reminder",
            NotificationType::PrescriptionCreated => "prescription_created",
            NotificationType::Other(tag) => tag,
        }
    }

}

impl From<String> for NotificationType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "new_message" => NotificationType::NewMessage,
            "new_appointment" => NotificationType::NewAppointment,
            "appointment_confirmed" => NotificationType::AppointmentConfirmed,
            "appointment_rejected" => NotificationType::AppointmentRejected,
            "appointment_reminder" => NotificationType::AppointmentReminder,
            "prescription_created" => NotificationType::PrescriptionCreated,
            _ => NotificationType::Other(s),
        }
    }
}

impl From<NotificationType> for String {
    fn from(t: NotificationType) -> Self {
        match t {
            NotificationType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

/// A user notification, as returned by the REST list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    /// Payload keyed by `notification_type`, e.g. `conversationId` for new_message.
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Notification {
    /// Logical version used to decide which of two copies is newer.
    pub fn version(&self) -> i64 {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Conversation to open for a new_message notification.
    pub fn conversation_id(&self) -> Option<&str> {
        match self.notification_type {
            NotificationType::NewMessage => self.data.get("conversationId")?.as_str(),
            _ => None,
        }
    }
}

/// Errors produced while validating a push payload.
#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("Malformed notification payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Notification event has an empty id")]
    EmptyId,
}

/// A notification event delivered over the push connection.
///
/// Same shape as [`Notification`] except that `data` and `isRead` may be
/// omitted by the server. An event without `isRead` says nothing about the
/// read state: a new id starts unread, a known id keeps its flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl PushEvent {
    /// Parse and validate a push payload.
    pub fn parse(payload: serde_json::Value) -> Result<Self, EventParseError> {
        let event: PushEvent = serde_json::from_value(payload)?;
        if event.id.trim().is_empty() {
            return Err(EventParseError::EmptyId);
        }
        Ok(event)
    }
}

impl From<PushEvent> for Notification {
    fn from(event: PushEvent) -> Self {
        Notification {
            id: event.id,
            notification_type: event.notification_type,
            title: event.title,
            message: event.message,
            data: event.data.unwrap_or(serde_json::Value::Null),
            is_read: event.is_read.unwrap_or(false),
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}
