//! Location and booking relay for the ride variant.
//!
//! Location ticks are persisted twice (current position + append-only
//! history) before any fan-out. Booking offers go only to drivers whose
//! taxi is registered live; the passenger gets a count, not per-driver
//! detail.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde_json::json;
use uuid::Uuid;

use crate::error::RelayError;
use crate::realtime::registry::IdentityKey;
use crate::realtime::rooms::{broadcast_to_all, send_to_conn};
use crate::realtime::ConnId;
use crate::ride::geo::{self, TaxiPosition};
use crate::state::AppState;
use crate::ws::protocol::{
    frame, AcceptBooking, BookingRequest, DriverJoin, LocationUpdate, PassengerJoin,
};

/// `driver_join`: presence for the taxi, keyed by taxi id — a driver is
/// reachable through the vehicle they operate.
pub fn handle_driver_join(state: &AppState, conn_id: ConnId, payload: DriverJoin) {
    state
        .registry
        .register(IdentityKey::Taxi(payload.taxi_id.clone()), conn_id, "driver");
    state.rooms.join(conn_id, &format!("taxi_{}", payload.taxi_id));

    tracing::info!(
        conn_id,
        taxi_id = %payload.taxi_id,
        driver_id = %payload.driver_id,
        "Driver joined"
    );
}

/// `passenger_join`: presence for a passenger.
pub fn handle_passenger_join(state: &AppState, conn_id: ConnId, payload: PassengerJoin) {
    state.registry.register(
        IdentityKey::Passenger(payload.passenger_id.clone()),
        conn_id,
        "passenger",
    );
    state
        .rooms
        .join(conn_id, &format!("passenger_{}", payload.passenger_id));

    tracing::info!(conn_id, passenger_id = %payload.passenger_id, "Passenger joined");
}

/// `location_update`: two durable writes, then a broadcast to every other
/// connection. The unscoped fan-out is a known scaling limit (see
/// DESIGN.md). Coordinates and timestamps are not validated.
pub async fn handle_location_update(state: &AppState, conn_id: ConnId, payload: LocationUpdate) {
    let db = state.db.clone();
    let taxi_id = payload.taxi_id.clone();
    let (lat, lng) = (payload.lat, payload.lng);
    let recorded_at = DateTime::<Utc>::from_timestamp_millis(payload.timestamp)
        .unwrap_or_else(Utc::now)
        .to_rfc3339();

    let result = tokio::task::spawn_blocking(move || -> Result<(), RelayError> {
        let conn = db
            .lock()
            .map_err(|_| RelayError::Persistence("database lock poisoned".into()))?;

        // Current position: the in-memory copy clients hold is only a cache
        // of this row.
        conn.execute(
            "UPDATE taxis SET current_lat = ?1, current_lng = ?2, last_location_update = ?3 WHERE id = ?4",
            params![lat, lng, recorded_at, taxi_id],
        )?;

        // Append-only history row.
        conn.execute(
            "INSERT INTO taxi_locations (taxi_id, lat, lng, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![taxi_id, lat, lng, recorded_at],
        )?;

        Ok(())
    })
    .await
    .unwrap_or_else(|e| Err(e.into()));

    match result {
        Ok(()) => {
            let frame = frame(
                "taxi_location_update",
                json!({
                    "taxiId": payload.taxi_id,
                    "lat": payload.lat,
                    "lng": payload.lng,
                    "timestamp": payload.timestamp,
                }),
            );
            broadcast_to_all(&state.peers, &frame, Some(conn_id));

            tracing::debug!(
                taxi_id = %payload.taxi_id,
                lat = payload.lat,
                lng = payload.lng,
                "Location updated"
            );
        }
        Err(err) => {
            // No error event exists for location ticks; the tick is lost.
            tracing::warn!(conn_id, taxi_id = %payload.taxi_id, error = %err, "location_update failed");
        }
    }
}

/// `booking_request`: geofilter available taxis around the pickup point and
/// offer the ride to every candidate whose driver is connected. The
/// passenger only learns how many candidates there were.
pub async fn handle_booking_request(state: &AppState, conn_id: ConnId, payload: BookingRequest) {
    let db = state.db.clone();

    let positions = tokio::task::spawn_blocking(move || -> Result<Vec<TaxiPosition>, RelayError> {
        let conn = db
            .lock()
            .map_err(|_| RelayError::Persistence("database lock poisoned".into()))?;
        let mut stmt = conn.prepare(
            "SELECT id, current_lat, current_lng FROM taxis
             WHERE is_available = 1 AND current_lat IS NOT NULL AND current_lng IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(TaxiPosition {
                    taxi_id: row.get(0)?,
                    lat: row.get(1)?,
                    lng: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
    .await
    .unwrap_or_else(|e| Err(e.into()));

    let positions = match positions {
        Ok(rows) => rows,
        Err(err) => {
            tracing::warn!(conn_id, error = %err, "booking_request failed");
            send_to_conn(
                &state.peers,
                conn_id,
                &frame(
                    "booking_error",
                    json!({ "message": "Failed to process booking request" }),
                ),
            );
            return;
        }
    };

    let candidates = geo::rank_nearby(payload.pickup_lat, payload.pickup_lng, &positions);

    // Offer the ride to each candidate's live driver connection. Drivers
    // that are in the store but not registered are silently skipped.
    for candidate in &candidates {
        let key = IdentityKey::Taxi(candidate.taxi_id.clone());
        if let Some(driver_conn) = state.registry.lookup(&key) {
            let offer = frame(
                "booking_request",
                json!({
                    "passengerId": payload.passenger_id,
                    "pickupLat": payload.pickup_lat,
                    "pickupLng": payload.pickup_lng,
                    "destinationLat": payload.destination_lat,
                    "destinationLng": payload.destination_lng,
                    "distance": candidate.distance_km,
                }),
            );
            send_to_conn(&state.peers, driver_conn, &offer);
        }
    }

    send_to_conn(
        &state.peers,
        conn_id,
        &frame(
            "booking_request_sent",
            json!({ "nearbyTaxisCount": candidates.len() }),
        ),
    );

    tracing::info!(
        conn_id,
        passenger_id = %payload.passenger_id,
        candidates = candidates.len(),
        "Booking request relayed"
    );
}

/// `accept_booking`: create the booking and flip the taxi unavailable in
/// one transaction, then notify the passenger (if connected) and echo a
/// confirmation to the driver.
pub async fn handle_accept_booking(state: &AppState, conn_id: ConnId, payload: AcceptBooking) {
    let db = state.db.clone();
    let taxi_id = payload.taxi_id.clone();
    let passenger_id = payload.passenger_id.clone();
    let estimated_arrival = payload.estimated_arrival.clone();
    let (pickup_lat, pickup_lng) = (payload.pickup_lat, payload.pickup_lng);
    let (destination_lat, destination_lng) = (payload.destination_lat, payload.destination_lng);

    let result = tokio::task::spawn_blocking(move || -> Result<String, RelayError> {
        let mut conn = db
            .lock()
            .map_err(|_| RelayError::Persistence("database lock poisoned".into()))?;

        // Both writes commit together or not at all: no window where the
        // booking exists but the taxi still looks available.
        let tx = conn.transaction()?;
        let booking_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO bookings (id, passenger_id, taxi_id, pickup_lat, pickup_lng,
                                   destination_lat, destination_lng, status, estimated_arrival, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'accepted', ?8, ?9)",
            params![
                booking_id,
                passenger_id,
                taxi_id,
                pickup_lat,
                pickup_lng,
                destination_lat,
                destination_lng,
                estimated_arrival,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.execute(
            "UPDATE taxis SET is_available = 0 WHERE id = ?1",
            params![taxi_id],
        )?;
        tx.commit()?;

        Ok(booking_id)
    })
    .await
    .unwrap_or_else(|e| Err(e.into()));

    match result {
        Ok(booking_id) => {
            let key = IdentityKey::Passenger(payload.passenger_id.clone());
            if let Some(passenger_conn) = state.registry.lookup(&key) {
                let accepted = frame(
                    "booking_accepted",
                    json!({
                        "bookingId": booking_id,
                        "taxiId": payload.taxi_id,
                        "estimatedArrival": payload.estimated_arrival,
                    }),
                );
                send_to_conn(&state.peers, passenger_conn, &accepted);
            }

            send_to_conn(
                &state.peers,
                conn_id,
                &frame(
                    "booking_accepted_confirmation",
                    json!({ "bookingId": booking_id }),
                ),
            );

            tracing::info!(
                conn_id,
                taxi_id = %payload.taxi_id,
                passenger_id = %payload.passenger_id,
                "Booking accepted"
            );
        }
        Err(err) => {
            tracing::warn!(conn_id, taxi_id = %payload.taxi_id, error = %err, "accept_booking failed");
            send_to_conn(
                &state.peers,
                conn_id,
                &frame(
                    "booking_error",
                    json!({ "message": "Failed to accept booking" }),
                ),
            );
        }
    }
}
