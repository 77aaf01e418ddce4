//! Integration tests for the chat relay: room authorization, persist-then-
//! broadcast ordering, read receipts, and notification side effects.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use medicab_server::db::DbPool;
use medicab_server::state::AppState;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the server on a random port and return its state and address.
async fn start_test_server() -> (AppState, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = medicab_server::db::init_db(&data_dir).expect("Failed to init DB");
    let state = AppState::new(db);

    let app = medicab_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
        let _keep = tmp_dir;
    });

    (state, addr)
}

fn seed_user(db: &DbPool, id: &str, first: &str, last: &str, role: &str) {
    let conn = db.lock().unwrap();
    conn.execute(
        "INSERT INTO users (id, first_name, last_name, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id, first, last, role, "2024-01-01T00:00:00Z"],
    )
    .unwrap();
}

fn seed_chat(db: &DbPool, chat_id: &str, patient_id: &str, doctor_id: &str) {
    let conn = db.lock().unwrap();
    conn.execute(
        "INSERT INTO chats (id, patient_id, doctor_id, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'active', ?4, ?4)",
        rusqlite::params![chat_id, patient_id, doctor_id, "2024-01-01T00:00:00Z"],
    )
    .unwrap();
}

fn seed_doctor(db: &DbPool, user_id: &str, is_available: bool) {
    let conn = db.lock().unwrap();
    conn.execute(
        "INSERT INTO doctors (user_id, specialties, is_available, updated_at) VALUES (?1, NULL, ?2, ?3)",
        rusqlite::params![user_id, is_available, "2024-01-01T00:00:00Z"],
    )
    .unwrap();
}

async fn connect(addr: SocketAddr) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    stream
}

async fn send_event(ws: &mut WsStream, event: &str, data: Value) {
    let body = json!({ "event": event, "data": data }).to_string();
    ws.send(Message::Text(body.into())).await.expect("send failed");
}

/// Read the next event frame within a timeout. Returns (event, data).
async fn next_event(ws: &mut WsStream) -> Option<(String, Value)> {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let value: Value = serde_json::from_str(text.as_str()).ok()?;
                let event = value["event"].as_str()?.to_string();
                return Some((event, value["data"].clone()));
            }
            Ok(Some(Ok(_))) => continue, // ping/pong frames
            _ => return None,
        }
    }
}

/// Assert that no event arrives within a short window.
async fn assert_silent(ws: &mut WsStream) {
    match tokio::time::timeout(Duration::from_millis(400), ws.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => {
            panic!("Expected no event, got: {}", text.as_str());
        }
        _ => {}
    }
}

/// Let the server process fire-and-forget events that carry no reply.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn message_reaches_both_chat_members_and_touches_watermark() {
    let (state, addr) = start_test_server().await;
    seed_user(&state.db, "1", "Abebe", "Kebede", "patient");
    seed_user(&state.db, "2", "Sara", "Tesfaye", "doctor");
    seed_chat(&state.db, "42", "1", "2");

    let mut patient = connect(addr).await;
    let mut doctor = connect(addr).await;

    send_event(&mut patient, "user_join", json!({"userId": "1", "role": "patient"})).await;
    send_event(&mut patient, "join_chat", json!({"chatId": "42", "userId": "1"})).await;
    send_event(&mut doctor, "user_join", json!({"userId": "2", "role": "doctor"})).await;
    send_event(&mut doctor, "join_chat", json!({"chatId": "42", "userId": "2"})).await;
    settle().await;

    send_event(
        &mut patient,
        "send_message",
        json!({"chatId": "42", "senderId": "1", "content": "hello"}),
    )
    .await;

    // Both members receive the enriched message, including the sender.
    let (event, data) = next_event(&mut patient).await.expect("patient should receive");
    assert_eq!(event, "new_message");
    assert_eq!(data["content"], "hello");
    assert_eq!(data["sender_id"], "1");
    assert_eq!(data["sender_first_name"], "Abebe");

    let (event, data) = next_event(&mut doctor).await.expect("doctor should receive");
    assert_eq!(event, "new_message");
    assert_eq!(data["content"], "hello");
    assert_eq!(data["sender_id"], "1");

    // The doctor is registered, so the notification is delivered live too.
    let (event, data) = next_event(&mut doctor).await.expect("doctor notification");
    assert_eq!(event, "new_notification");
    assert_eq!(data["user_id"], "2");
    assert_eq!(data["notification_type"], "chat_message");

    // Conversation-list watermark was refreshed.
    let updated_at: String = state
        .db
        .lock()
        .unwrap()
        .query_row(
            "SELECT updated_at FROM chats WHERE id = '42'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_ne!(updated_at, "2024-01-01T00:00:00Z");
}

#[tokio::test]
async fn outsider_cannot_send_and_leaves_no_trace() {
    let (state, addr) = start_test_server().await;
    seed_user(&state.db, "1", "Abebe", "Kebede", "patient");
    seed_user(&state.db, "2", "Sara", "Tesfaye", "doctor");
    seed_user(&state.db, "3", "Mulu", "Alemu", "patient");
    seed_chat(&state.db, "42", "1", "2");

    let mut member = connect(addr).await;
    let mut outsider = connect(addr).await;

    send_event(&mut member, "user_join", json!({"userId": "1"})).await;
    send_event(&mut member, "join_chat", json!({"chatId": "42", "userId": "1"})).await;
    send_event(&mut outsider, "user_join", json!({"userId": "3"})).await;
    settle().await;

    // Joining someone else's chat is rejected.
    send_event(&mut outsider, "join_chat", json!({"chatId": "42", "userId": "3"})).await;
    let (event, _) = next_event(&mut outsider).await.expect("expected rejection");
    assert_eq!(event, "message_error");

    // Sending into it is rejected, only the sender hears about it.
    send_event(
        &mut outsider,
        "send_message",
        json!({"chatId": "42", "senderId": "3", "content": "let me in"}),
    )
    .await;
    let (event, _) = next_event(&mut outsider).await.expect("expected error");
    assert_eq!(event, "message_error");
    assert_silent(&mut member).await;

    // And nothing was persisted.
    let count: i64 = state
        .db
        .lock()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn failed_persistence_means_no_broadcast() {
    let (state, addr) = start_test_server().await;
    seed_user(&state.db, "1", "Abebe", "Kebede", "patient");
    seed_user(&state.db, "2", "Sara", "Tesfaye", "doctor");
    seed_chat(&state.db, "42", "1", "2");

    let mut patient = connect(addr).await;
    let mut doctor = connect(addr).await;

    send_event(&mut patient, "user_join", json!({"userId": "1"})).await;
    send_event(&mut patient, "join_chat", json!({"chatId": "42", "userId": "1"})).await;
    send_event(&mut doctor, "user_join", json!({"userId": "2"})).await;
    send_event(&mut doctor, "join_chat", json!({"chatId": "42", "userId": "2"})).await;
    settle().await;

    // A chat that does not exist fails before the durability point:
    // the sender gets an error, no member observes any new_message.
    send_event(
        &mut patient,
        "send_message",
        json!({"chatId": "999", "senderId": "1", "content": "lost"}),
    )
    .await;

    let (event, _) = next_event(&mut patient).await.expect("expected error");
    assert_eq!(event, "message_error");
    assert_silent(&mut doctor).await;

    let count: i64 = state
        .db
        .lock()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn message_scoped_to_its_own_chat_room() {
    let (state, addr) = start_test_server().await;
    seed_user(&state.db, "1", "Abebe", "Kebede", "patient");
    seed_user(&state.db, "2", "Sara", "Tesfaye", "doctor");
    seed_user(&state.db, "3", "Mulu", "Alemu", "patient");
    seed_user(&state.db, "4", "Hana", "Bekele", "doctor");
    seed_chat(&state.db, "a", "1", "2");
    seed_chat(&state.db, "b", "3", "4");

    let mut in_a = connect(addr).await;
    let mut in_b = connect(addr).await;

    send_event(&mut in_a, "user_join", json!({"userId": "1"})).await;
    send_event(&mut in_a, "join_chat", json!({"chatId": "a", "userId": "1"})).await;
    send_event(&mut in_b, "user_join", json!({"userId": "3"})).await;
    send_event(&mut in_b, "join_chat", json!({"chatId": "b", "userId": "3"})).await;
    settle().await;

    send_event(
        &mut in_a,
        "send_message",
        json!({"chatId": "a", "senderId": "1", "content": "only for chat a"}),
    )
    .await;

    let (event, data) = next_event(&mut in_a).await.expect("member of a receives");
    assert_eq!(event, "new_message");
    assert_eq!(data["chat_id"], "a");

    // A connection that only joined chat b's room never sees it.
    assert_silent(&mut in_b).await;
}

#[tokio::test]
async fn mark_read_flips_unread_in_bulk() {
    let (state, addr) = start_test_server().await;
    seed_user(&state.db, "1", "Abebe", "Kebede", "patient");
    seed_user(&state.db, "2", "Sara", "Tesfaye", "doctor");
    seed_chat(&state.db, "42", "1", "2");

    let mut patient = connect(addr).await;
    let mut doctor = connect(addr).await;

    send_event(&mut patient, "user_join", json!({"userId": "1"})).await;
    send_event(&mut patient, "join_chat", json!({"chatId": "42", "userId": "1"})).await;
    send_event(&mut doctor, "user_join", json!({"userId": "2"})).await;
    send_event(&mut doctor, "join_chat", json!({"chatId": "42", "userId": "2"})).await;
    settle().await;

    for content in ["one", "two"] {
        send_event(
            &mut patient,
            "send_message",
            json!({"chatId": "42", "senderId": "1", "content": content}),
        )
        .await;
        let _ = next_event(&mut patient).await;
        let _ = next_event(&mut doctor).await; // new_message
        let _ = next_event(&mut doctor).await; // new_notification
    }

    send_event(&mut doctor, "mark_read", json!({"chatId": "42", "userId": "2"})).await;

    let (event, data) = next_event(&mut doctor).await.expect("reader receives receipt");
    assert_eq!(event, "messages_read");
    assert_eq!(data["chatId"], "42");
    assert_eq!(data["userId"], "2");

    let (event, _) = next_event(&mut patient).await.expect("sender receives receipt");
    assert_eq!(event, "messages_read");

    let unread: i64 = state
        .db
        .lock()
        .unwrap()
        .query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = '42' AND read_flag = 0 AND sender_id != '2'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(unread, 0);
}

#[tokio::test]
async fn typing_indicator_excludes_sender_and_persists_nothing() {
    let (state, addr) = start_test_server().await;
    seed_user(&state.db, "1", "Abebe", "Kebede", "patient");
    seed_user(&state.db, "2", "Sara", "Tesfaye", "doctor");
    seed_chat(&state.db, "42", "1", "2");

    let mut patient = connect(addr).await;
    let mut doctor = connect(addr).await;

    send_event(&mut patient, "user_join", json!({"userId": "1"})).await;
    send_event(&mut patient, "join_chat", json!({"chatId": "42", "userId": "1"})).await;
    send_event(&mut doctor, "user_join", json!({"userId": "2"})).await;
    send_event(&mut doctor, "join_chat", json!({"chatId": "42", "userId": "2"})).await;
    settle().await;

    send_event(&mut patient, "typing", json!({"chatId": "42", "userId": "1"})).await;

    let (event, data) = next_event(&mut doctor).await.expect("doctor sees typing");
    assert_eq!(event, "user_typing");
    assert_eq!(data["userId"], "1");
    assert_silent(&mut patient).await;

    send_event(&mut patient, "stop_typing", json!({"chatId": "42", "userId": "1"})).await;
    let (event, _) = next_event(&mut doctor).await.expect("doctor sees stop");
    assert_eq!(event, "user_stop_typing");

    let count: i64 = state
        .db
        .lock()
        .unwrap()
        .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn offline_counterpart_still_gets_a_durable_notification() {
    let (state, addr) = start_test_server().await;
    seed_user(&state.db, "1", "Abebe", "Kebede", "patient");
    seed_user(&state.db, "2", "Sara", "Tesfaye", "doctor");
    seed_chat(&state.db, "42", "1", "2");

    // Only the patient connects; the doctor is offline.
    let mut patient = connect(addr).await;
    send_event(&mut patient, "user_join", json!({"userId": "1"})).await;
    send_event(&mut patient, "join_chat", json!({"chatId": "42", "userId": "1"})).await;
    settle().await;

    send_event(
        &mut patient,
        "send_message",
        json!({"chatId": "42", "senderId": "1", "content": "are you there?"}),
    )
    .await;

    let (event, _) = next_event(&mut patient).await.expect("sender still receives");
    assert_eq!(event, "new_message");
    settle().await;

    // The live push is skipped, but the notification row is durable.
    let (count, recipient): (i64, String) = state
        .db
        .lock()
        .unwrap()
        .query_row(
            "SELECT COUNT(*), MAX(user_id) FROM notifications",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(recipient, "2");
}

#[tokio::test]
async fn availability_change_is_durable_and_global() {
    let (state, addr) = start_test_server().await;
    seed_user(&state.db, "2", "Sara", "Tesfaye", "doctor");
    seed_doctor(&state.db, "2", true);

    let mut doctor = connect(addr).await;
    let mut bystander = connect(addr).await;

    send_event(&mut doctor, "user_join", json!({"userId": "2", "role": "doctor"})).await;
    send_event(&mut bystander, "user_join", json!({"userId": "9"})).await;
    settle().await;

    send_event(
        &mut doctor,
        "update_availability",
        json!({"doctorId": "2", "isAvailable": false}),
    )
    .await;

    // Global broadcast: every connection hears it, including the doctor.
    let (event, data) = next_event(&mut bystander).await.expect("bystander hears");
    assert_eq!(event, "doctor_availability_changed");
    assert_eq!(data["doctorId"], "2");
    assert_eq!(data["isAvailable"], false);

    let (event, _) = next_event(&mut doctor).await.expect("doctor hears");
    assert_eq!(event, "doctor_availability_changed");

    let available: bool = state
        .db
        .lock()
        .unwrap()
        .query_row(
            "SELECT is_available FROM doctors WHERE user_id = '2'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(!available);
}

#[tokio::test]
async fn appointment_updates_reach_only_the_affected_user() {
    let (state, addr) = start_test_server().await;

    let mut affected = connect(addr).await;
    let mut other = connect(addr).await;

    send_event(&mut affected, "user_join", json!({"userId": "1"})).await;
    send_event(&mut other, "user_join", json!({"userId": "9"})).await;
    settle().await;

    // The appointment CRUD layer drives this emit after its own update.
    medicab_server::chat::events::emit_appointment_updated(
        &state,
        "1",
        json!({"appointmentId": "ap-1", "status": "confirmed"}),
    );

    let (event, data) = next_event(&mut affected).await.expect("affected user hears");
    assert_eq!(event, "appointment_updated");
    assert_eq!(data["status"], "confirmed");
    assert_silent(&mut other).await;
}

#[tokio::test]
async fn client_ping_gets_pong() {
    let (_state, addr) = start_test_server().await;
    let mut ws = connect(addr).await;

    ws.send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Expected pong within timeout");

    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => panic!("Expected Pong message, got: {:?}", other),
    }
}

#[tokio::test]
async fn disconnect_purges_presence_and_rooms() {
    let (state, addr) = start_test_server().await;
    seed_user(&state.db, "1", "Abebe", "Kebede", "patient");
    seed_user(&state.db, "2", "Sara", "Tesfaye", "doctor");
    seed_chat(&state.db, "42", "1", "2");

    let mut patient = connect(addr).await;
    send_event(&mut patient, "user_join", json!({"userId": "1"})).await;
    send_event(&mut patient, "join_chat", json!({"chatId": "42", "userId": "1"})).await;
    settle().await;

    let key = medicab_server::realtime::registry::IdentityKey::User("1".to_string());
    let conn_id = state.registry.lookup(&key).expect("registered while connected");
    assert!(state.rooms.is_member(conn_id, "chat_42"));

    patient.send(Message::Close(None)).await.unwrap();
    drop(patient);
    settle().await;

    assert_eq!(state.registry.lookup(&key), None);
    assert!(!state.rooms.is_member(conn_id, "chat_42"));
    assert!(state.rooms.rooms_of(conn_id).is_empty());
}
