//! Message relay: authorize against durable chat relationships, persist,
//! then fan out over rooms.
//!
//! Authorization always consults the chats table — the relay never decides
//! membership from in-memory state. Persistence strictly precedes
//! broadcast: if the durable write fails, no event leaves the server.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

use crate::chat::events;
use crate::db::models::{MessageRow, NotificationRow};
use crate::error::RelayError;
use crate::realtime::registry::IdentityKey;
use crate::realtime::ConnId;
use crate::state::AppState;
use crate::ws::protocol::{ChatActivity, JoinChat, SendMessage, UpdateAvailability, UserJoin};

/// `user_join`: record presence for a platform user and put the connection
/// in its own notification room. The announced identity is trusted as-is.
pub fn handle_user_join(state: &AppState, conn_id: ConnId, payload: UserJoin) {
    let role = payload.role.as_deref().unwrap_or("user");
    state
        .registry
        .register(IdentityKey::User(payload.user_id.clone()), conn_id, role);
    state
        .rooms
        .join(conn_id, &events::user_room(&payload.user_id));

    tracing::info!(conn_id, user_id = %payload.user_id, role, "User joined");
}

/// `join_chat`: verify the user is a party to the chat, then add the
/// connection to the chat room.
pub async fn handle_join_chat(state: &AppState, conn_id: ConnId, payload: JoinChat) {
    match authorize_chat_member(state, &payload.chat_id, &payload.user_id).await {
        Ok(_) => {
            state.rooms.join(conn_id, &events::chat_room(&payload.chat_id));
            tracing::info!(
                conn_id,
                chat_id = %payload.chat_id,
                user_id = %payload.user_id,
                "Joined chat room"
            );
        }
        Err(err) => {
            tracing::warn!(conn_id, chat_id = %payload.chat_id, error = %err, "join_chat rejected");
            events::emit_message_error(state, conn_id, &err.client_message());
        }
    }
}

/// `send_message`: authorize, persist, touch the chat watermark, enrich
/// with sender display fields, broadcast, then handle the notification
/// side effects.
pub async fn handle_send_message(state: &AppState, conn_id: ConnId, payload: SendMessage) {
    match relay_message(state, &payload).await {
        Ok((message, counterpart_id)) => {
            // Durability point passed — fan out to the chat room.
            events::broadcast_new_message(state, &message);
            notify_counterpart(state, &message, &counterpart_id).await;
        }
        Err(err) => {
            tracing::warn!(
                conn_id,
                chat_id = %payload.chat_id,
                sender_id = %payload.sender_id,
                error = %err,
                "send_message failed"
            );
            events::emit_message_error(state, conn_id, &err.client_message());
        }
    }
}

/// `typing` / `stop_typing`: authorize-then-broadcast, nothing durable.
pub async fn handle_typing(state: &AppState, conn_id: ConnId, payload: ChatActivity, typing: bool) {
    match authorize_chat_member(state, &payload.chat_id, &payload.user_id).await {
        Ok(_) => {
            events::broadcast_typing(state, &payload.chat_id, &payload.user_id, typing, conn_id);
        }
        Err(err) => {
            events::emit_message_error(state, conn_id, &err.client_message());
        }
    }
}

/// `mark_read`: flip every unread message from the counterpart in one
/// statement, then tell the room. No individual-message targeting.
pub async fn handle_mark_read(state: &AppState, conn_id: ConnId, payload: ChatActivity) {
    let result = async {
        authorize_chat_member(state, &payload.chat_id, &payload.user_id).await?;

        let db = state.db.clone();
        let chat_id = payload.chat_id.clone();
        let user_id = payload.user_id.clone();
        tokio::task::spawn_blocking(move || -> Result<(), RelayError> {
            let conn = db
                .lock()
                .map_err(|_| RelayError::Persistence("database lock poisoned".into()))?;
            conn.execute(
                "UPDATE messages SET read_flag = 1 WHERE chat_id = ?1 AND sender_id != ?2",
                params![chat_id, user_id],
            )?;
            Ok(())
        })
        .await?
    }
    .await;

    match result {
        Ok(()) => {
            events::broadcast_messages_read(state, &payload.chat_id, &payload.user_id);
        }
        Err(err) => {
            tracing::warn!(conn_id, chat_id = %payload.chat_id, error = %err, "mark_read failed");
            events::emit_message_error(state, conn_id, &err.client_message());
        }
    }
}

/// `update_availability`: durable doctors update, then a global broadcast
/// so every connected client can refresh its doctor list.
pub async fn handle_update_availability(
    state: &AppState,
    conn_id: ConnId,
    payload: UpdateAvailability,
) {
    let db = state.db.clone();
    let doctor_id = payload.doctor_id.clone();
    let is_available = payload.is_available;

    let result = tokio::task::spawn_blocking(move || -> Result<(), RelayError> {
        let conn = db
            .lock()
            .map_err(|_| RelayError::Persistence("database lock poisoned".into()))?;
        let updated = conn.execute(
            "UPDATE doctors SET is_available = ?1, updated_at = ?2 WHERE user_id = ?3",
            params![is_available, Utc::now().to_rfc3339(), doctor_id],
        )?;
        if updated == 0 {
            return Err(RelayError::NotFound("Doctor not found".into()));
        }
        Ok(())
    })
    .await
    .unwrap_or_else(|e| Err(e.into()));

    match result {
        Ok(()) => {
            events::broadcast_doctor_availability(state, &payload.doctor_id, payload.is_available);
            tracing::info!(
                conn_id,
                doctor_id = %payload.doctor_id,
                is_available = payload.is_available,
                "Doctor availability updated"
            );
        }
        Err(err) => {
            tracing::warn!(conn_id, doctor_id = %payload.doctor_id, error = %err, "update_availability failed");
            events::emit_message_error(state, conn_id, &err.client_message());
        }
    }
}

// --- Internals ---

/// Fetch the chat's parties and check `user_id` is one of them.
/// Returns (patient_id, doctor_id).
async fn authorize_chat_member(
    state: &AppState,
    chat_id: &str,
    user_id: &str,
) -> Result<(String, String), RelayError> {
    let db = state.db.clone();
    let cid = chat_id.to_string();

    let parties = tokio::task::spawn_blocking(move || -> Result<Option<(String, String)>, RelayError> {
        let conn = db
            .lock()
            .map_err(|_| RelayError::Persistence("database lock poisoned".into()))?;
        let row = conn
            .query_row(
                "SELECT patient_id, doctor_id FROM chats WHERE id = ?1",
                params![cid],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row)
    })
    .await??;

    let (patient_id, doctor_id) =
        parties.ok_or_else(|| RelayError::NotFound("Chat not found".to_string()))?;

    if user_id != patient_id && user_id != doctor_id {
        return Err(RelayError::Unauthorized(
            "Not a participant of this chat".to_string(),
        ));
    }

    Ok((patient_id, doctor_id))
}

/// Authorize, persist the message, touch the chat watermark, and enrich
/// with the sender's display fields. Returns the broadcast-ready row and
/// the counterpart's user id.
async fn relay_message(
    state: &AppState,
    payload: &SendMessage,
) -> Result<(MessageRow, String), RelayError> {
    let (patient_id, doctor_id) =
        authorize_chat_member(state, &payload.chat_id, &payload.sender_id).await?;

    let counterpart_id = if payload.sender_id == patient_id {
        doctor_id
    } else {
        patient_id
    };

    let db = state.db.clone();
    let chat_id = payload.chat_id.clone();
    let sender_id = payload.sender_id.clone();
    let content = payload.content.clone();
    let attachments = payload.attachments.clone();
    let message_type = payload
        .message_type
        .clone()
        .unwrap_or_else(|| "text".to_string());

    let message = tokio::task::spawn_blocking(move || -> Result<MessageRow, RelayError> {
        let conn = db
            .lock()
            .map_err(|_| RelayError::Persistence("database lock poisoned".into()))?;

        let now = Utc::now().to_rfc3339();
        let attachments_text = attachments
            .as_ref()
            .map(|value| value.to_string());

        // Durability point: the broadcast must never run ahead of this row.
        conn.execute(
            "INSERT INTO messages (chat_id, sender_id, content, attachments, message_type, read_flag, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![chat_id, sender_id, content, attachments_text, message_type, now],
        )?;
        let message_id = conn.last_insert_rowid();

        // Conversation-list ordering watermark for the REST collaborators.
        conn.execute(
            "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
            params![now, chat_id],
        )?;

        // Enrich with sender display fields for the broadcast payload.
        let (first_name, last_name): (String, String) = conn.query_row(
            "SELECT first_name, last_name FROM users WHERE id = ?1",
            params![sender_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(MessageRow {
            id: message_id,
            chat_id,
            sender_id,
            content,
            attachments,
            message_type,
            read_flag: false,
            created_at: now,
            sender_first_name: first_name,
            sender_last_name: last_name,
        })
    })
    .await??;

    Ok((message, counterpart_id))
}

/// Delivery-adjacent side effects: persist a notification for the
/// counterpart, deliver it live when they are connected, and hand the
/// payload to the offline sink otherwise.
async fn notify_counterpart(state: &AppState, message: &MessageRow, counterpart_id: &str) {
    let db = state.db.clone();
    let recipient = counterpart_id.to_string();
    let text = format!(
        "New message from {} {}",
        message.sender_first_name, message.sender_last_name
    );

    let notification = tokio::task::spawn_blocking(move || -> Result<NotificationRow, RelayError> {
        let conn = db
            .lock()
            .map_err(|_| RelayError::Persistence("database lock poisoned".into()))?;
        let row = NotificationRow {
            id: Uuid::new_v4().to_string(),
            user_id: recipient,
            message: text,
            notification_type: "chat_message".to_string(),
            is_read: false,
            created_at: Utc::now().to_rfc3339(),
        };
        conn.execute(
            "INSERT INTO notifications (id, user_id, message, notification_type, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![row.id, row.user_id, row.message, row.notification_type, row.created_at],
        )?;
        Ok(row)
    })
    .await
    .unwrap_or_else(|e| Err(e.into()));

    let notification = match notification {
        Ok(row) => row,
        Err(err) => {
            // The message itself already went out; a failed notification
            // write is logged, not surfaced to either party.
            tracing::warn!(error = %err, "Failed to persist notification");
            return;
        }
    };

    let key = IdentityKey::User(counterpart_id.to_string());
    if state.registry.lookup(&key).is_some() {
        events::emit_new_notification(state, &notification);
    } else {
        state.notifier.notify_offline(
            counterpart_id,
            &json!({ "event": "new_notification", "data": notification }),
        );
    }
}
