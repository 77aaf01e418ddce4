//! Row types the relay materializes from the store.
//!
//! Only the rows that travel over the wire get structs; everything else is
//! read field-by-field at the query site. These serialize verbatim as
//! event payloads, so the wire fields are the snake_case column names.

use serde::Serialize;

/// A persisted chat message, enriched with sender display fields.
/// Broadcast as the `new_message` payload.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub attachments: Option<serde_json::Value>,
    pub message_type: String,
    pub read_flag: bool,
    pub created_at: String,
    pub sender_first_name: String,
    pub sender_last_name: String,
}

/// A persisted notification. Emitted as the `new_notification` payload and
/// handed to the offline sink when the recipient has no live connection.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub notification_type: String,
    pub is_read: bool,
    pub created_at: String,
}
