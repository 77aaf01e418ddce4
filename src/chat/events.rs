//! Outbound chat-surface events.
//!
//! Thin emit helpers over the room manager and peer map. Events carrying a
//! persisted row serialize the row verbatim (snake_case columns); the rest
//! echo the camelCase field names clients sent.

use axum::extract::ws::Message;
use serde_json::{json, Value};

use crate::db::models::{MessageRow, NotificationRow};
use crate::realtime::rooms::{broadcast_to_all, send_to_conn};
use crate::realtime::ConnId;
use crate::state::AppState;
use crate::ws::protocol::frame;

/// Room id for a chat session.
pub fn chat_room(chat_id: &str) -> String {
    format!("chat_{chat_id}")
}

/// Room id for a user's own notification scope.
pub fn user_room(user_id: &str) -> String {
    format!("user_{user_id}")
}

/// `message_error` — to the originating connection only.
pub fn emit_message_error(state: &AppState, conn_id: ConnId, message: &str) {
    let frame = frame("message_error", json!({ "message": message }));
    send_to_conn(&state.peers, conn_id, &frame);
}

/// `new_message` — to every current member of the chat room, including the
/// sender (idempotent client state).
pub fn broadcast_new_message(state: &AppState, message: &MessageRow) {
    let frame = frame("new_message", json!(message));
    state
        .rooms
        .broadcast(&state.peers, &chat_room(&message.chat_id), &frame, None);
}

/// `user_typing` / `user_stop_typing` — chat room, excluding the sender.
pub fn broadcast_typing(
    state: &AppState,
    chat_id: &str,
    user_id: &str,
    typing: bool,
    sender: ConnId,
) {
    let event = if typing { "user_typing" } else { "user_stop_typing" };
    let frame = frame(event, json!({ "chatId": chat_id, "userId": user_id }));
    state
        .rooms
        .broadcast(&state.peers, &chat_room(chat_id), &frame, Some(sender));
}

/// `messages_read` — chat room, so both parties refresh unread state.
pub fn broadcast_messages_read(state: &AppState, chat_id: &str, user_id: &str) {
    let frame = frame(
        "messages_read",
        json!({ "chatId": chat_id, "userId": user_id }),
    );
    state
        .rooms
        .broadcast(&state.peers, &chat_room(chat_id), &frame, None);
}

/// `new_notification` — the recipient's user room.
pub fn emit_new_notification(state: &AppState, notification: &NotificationRow) {
    let frame = frame("new_notification", json!(notification));
    state
        .rooms
        .broadcast(&state.peers, &user_room(&notification.user_id), &frame, None);
}

/// `appointment_updated` — the affected user's room. No inbound event
/// drives this; the appointment CRUD layer calls it after its own durable
/// update.
#[allow(dead_code)]
pub fn emit_appointment_updated(state: &AppState, user_id: &str, appointment: Value) {
    let frame = frame("appointment_updated", appointment);
    state
        .rooms
        .broadcast(&state.peers, &user_room(user_id), &frame, None);
}

/// `doctor_availability_changed` — every connection.
pub fn broadcast_doctor_availability(state: &AppState, doctor_id: &str, is_available: bool) {
    let frame: Message = frame(
        "doctor_availability_changed",
        json!({ "doctorId": doctor_id, "isAvailable": is_available }),
    );
    broadcast_to_all(&state.peers, &frame, None);
}
