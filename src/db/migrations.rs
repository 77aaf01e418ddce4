use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Users, care chat, notifications

CREATE TABLE users (
    id TEXT PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'patient',
    created_at TEXT NOT NULL
);

CREATE TABLE doctors (
    user_id TEXT PRIMARY KEY,
    specialties TEXT,
    is_available INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE TABLE chats (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    doctor_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (patient_id) REFERENCES users(id),
    FOREIGN KEY (doctor_id) REFERENCES users(id)
);

CREATE INDEX idx_chats_patient ON chats(patient_id);
CREATE INDEX idx_chats_doctor ON chats(doctor_id);

CREATE TABLE messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    content TEXT NOT NULL,
    attachments TEXT,
    message_type TEXT NOT NULL DEFAULT 'text',
    read_flag INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (chat_id) REFERENCES chats(id),
    FOREIGN KEY (sender_id) REFERENCES users(id)
);

CREATE INDEX idx_messages_chat ON messages(chat_id);
CREATE INDEX idx_messages_unread ON messages(chat_id, read_flag);

CREATE TABLE notifications (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    message TEXT NOT NULL,
    notification_type TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id)
);

CREATE INDEX idx_notifications_user ON notifications(user_id, is_read);
",
        ),
        M::up(
            "-- Migration 2: Ride booking

CREATE TABLE taxis (
    id TEXT PRIMARY KEY,
    driver_id TEXT NOT NULL,
    vehicle_type TEXT,
    plate_number TEXT,
    is_available INTEGER NOT NULL DEFAULT 1,
    current_lat REAL,
    current_lng REAL,
    last_location_update TEXT,
    FOREIGN KEY (driver_id) REFERENCES users(id)
);

CREATE INDEX idx_taxis_available ON taxis(is_available);

CREATE TABLE taxi_locations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    taxi_id TEXT NOT NULL,
    lat REAL NOT NULL,
    lng REAL NOT NULL,
    timestamp TEXT NOT NULL,
    FOREIGN KEY (taxi_id) REFERENCES taxis(id)
);

CREATE INDEX idx_taxi_locations_taxi ON taxi_locations(taxi_id);

CREATE TABLE bookings (
    id TEXT PRIMARY KEY,
    passenger_id TEXT NOT NULL,
    taxi_id TEXT NOT NULL,
    pickup_lat REAL,
    pickup_lng REAL,
    destination_lat REAL,
    destination_lng REAL,
    status TEXT NOT NULL DEFAULT 'pending',
    estimated_arrival TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (passenger_id) REFERENCES users(id),
    FOREIGN KEY (taxi_id) REFERENCES taxis(id)
);

CREATE INDEX idx_bookings_passenger ON bookings(passenger_id);
CREATE INDEX idx_bookings_taxi ON bookings(taxi_id);
",
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }
}
