//! Test data

use super::constants::*;
use inbox_sync::notifications::{Notification, NotificationType};
use serde_json::json;

pub fn notification(id: &str, created_at: i64, is_read: bool) -> Notification {
    Notification {
        id: id.to_string(),
        notification_type: NotificationType::NewMessage,
        title: "New message".to_string(),
        message: format!("Message {}", id),
        data: json!({ "conversationId": format!("conv-{}", id) }),
        is_read,
        created_at,
        updated_at: None,
    }
}

/// Three notifications, one of them already read.
pub fn seed_notifications() -> Vec<Notification> {
    vec![
        notification(NOTIFICATION_OLD_ID, 1_700_000_000, true),
        notification(NOTIFICATION_MID_ID, 1_700_000_100, false),
        notification(NOTIFICATION_NEW_ID, 1_700_000_200, false),
    ]
}

/// A `notification` push frame.
pub fn notification_frame(notification: &Notification) -> String {
    json!({ "type": "notification", "payload": notification }).to_string()
}
