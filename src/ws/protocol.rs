//! Realtime event surface.
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": {...}}`. Inbound payload fields are
//! camelCase (what the clients send); outbound events that carry persisted
//! rows use the snake_case column names, matching the upstream contract.
//!
//! Malformed frames and unknown event names are logged and dropped —
//! payloads are otherwise taken at face value.

use axum::extract::ws::Message;
use serde::Deserialize;
use serde_json::Value;

use crate::chat::relay as chat_relay;
use crate::realtime::ConnId;
use crate::ride::relay as ride_relay;
use crate::state::AppState;

// --- Inbound payloads ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoin {
    pub user_id: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverJoin {
    pub taxi_id: String,
    pub driver_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassengerJoin {
    pub passenger_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinChat {
    pub chat_id: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Option<Value>,
    #[serde(default)]
    pub message_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatActivity {
    pub chat_id: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub taxi_id: String,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub passenger_id: String,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub destination_lat: f64,
    pub destination_lng: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBooking {
    pub taxi_id: String,
    pub passenger_id: String,
    #[serde(default)]
    pub estimated_arrival: Option<String>,
    #[serde(default)]
    pub pickup_lat: Option<f64>,
    #[serde(default)]
    pub pickup_lng: Option<f64>,
    #[serde(default)]
    pub destination_lat: Option<f64>,
    #[serde(default)]
    pub destination_lng: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAvailability {
    pub doctor_id: String,
    pub is_available: bool,
}

/// Client-to-server events.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    UserJoin(UserJoin),
    DriverJoin(DriverJoin),
    PassengerJoin(PassengerJoin),
    JoinChat(JoinChat),
    SendMessage(SendMessage),
    Typing(ChatActivity),
    StopTyping(ChatActivity),
    MarkRead(ChatActivity),
    LocationUpdate(LocationUpdate),
    BookingRequest(BookingRequest),
    AcceptBooking(AcceptBooking),
    UpdateAvailability(UpdateAvailability),
}

/// Build an outbound frame.
pub fn frame(event: &str, data: Value) -> Message {
    let body = serde_json::json!({ "event": event, "data": data });
    Message::Text(body.to_string().into())
}

/// Parse one inbound text frame and dispatch it to the owning relay.
pub async fn handle_frame(text: &str, conn_id: ConnId, state: &AppState) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(conn_id, error = %e, "Dropping malformed frame");
            return;
        }
    };

    match event {
        ClientEvent::UserJoin(payload) => {
            chat_relay::handle_user_join(state, conn_id, payload);
        }
        ClientEvent::DriverJoin(payload) => {
            ride_relay::handle_driver_join(state, conn_id, payload);
        }
        ClientEvent::PassengerJoin(payload) => {
            ride_relay::handle_passenger_join(state, conn_id, payload);
        }
        ClientEvent::JoinChat(payload) => {
            chat_relay::handle_join_chat(state, conn_id, payload).await;
        }
        ClientEvent::SendMessage(payload) => {
            chat_relay::handle_send_message(state, conn_id, payload).await;
        }
        ClientEvent::Typing(payload) => {
            chat_relay::handle_typing(state, conn_id, payload, true).await;
        }
        ClientEvent::StopTyping(payload) => {
            chat_relay::handle_typing(state, conn_id, payload, false).await;
        }
        ClientEvent::MarkRead(payload) => {
            chat_relay::handle_mark_read(state, conn_id, payload).await;
        }
        ClientEvent::LocationUpdate(payload) => {
            ride_relay::handle_location_update(state, conn_id, payload).await;
        }
        ClientEvent::BookingRequest(payload) => {
            ride_relay::handle_booking_request(state, conn_id, payload).await;
        }
        ClientEvent::AcceptBooking(payload) => {
            ride_relay::handle_accept_booking(state, conn_id, payload).await;
        }
        ClientEvent::UpdateAvailability(payload) => {
            chat_relay::handle_update_availability(state, conn_id, payload).await;
        }
    }
}
