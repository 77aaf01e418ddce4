//! Great-circle math for the booking geofilter.
//!
//! SQLite has no trigonometric functions, so the haversine ranking runs
//! in-process over the available-taxi rows instead of inside the query.

/// Mean earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Drivers farther than this from the pickup point are never offered a ride.
pub const SEARCH_RADIUS_KM: f64 = 5.0;

/// Upper bound on the candidate set per booking request.
pub const MAX_CANDIDATES: usize = 10;

/// A taxi's last known position, read from the durable store.
#[derive(Debug, Clone)]
pub struct TaxiPosition {
    pub taxi_id: String,
    pub lat: f64,
    pub lng: f64,
}

/// A candidate within the search radius, with its distance to pickup.
#[derive(Debug, Clone)]
pub struct RankedTaxi {
    pub taxi_id: String,
    pub distance_km: f64,
}

/// Haversine great-circle distance between two points, in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Filter to taxis within [`SEARCH_RADIUS_KM`] of pickup, ascending by
/// distance, capped at [`MAX_CANDIDATES`].
pub fn rank_nearby(pickup_lat: f64, pickup_lng: f64, taxis: &[TaxiPosition]) -> Vec<RankedTaxi> {
    let mut ranked: Vec<RankedTaxi> = taxis
        .iter()
        .map(|taxi| RankedTaxi {
            taxi_id: taxi.taxi_id.clone(),
            distance_km: haversine_km(pickup_lat, pickup_lng, taxi.lat, taxi.lng),
        })
        .filter(|candidate| candidate.distance_km < SEARCH_RADIUS_KM)
        .collect();

    ranked.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(MAX_CANDIDATES);
    ranked
}
