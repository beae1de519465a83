//! Distance estimation for impossible-travel detection.

use super::models::Location;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in kilometres (haversine).
#[must_use]
pub fn haversine_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = (from.0.to_radians(), from.1.to_radians());
    let (lat2, lon2) = (to.0.to_radians(), to.1.to_radians());

    let d_lat = lat2 - lat1;
    let d_lon = lon2 - lon1;

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Distance between two observed locations.
///
/// Uses coordinates when both sides have them. Otherwise identical labels are
/// zero apart and differing labels fall back to `unresolved_km`.
#[must_use]
pub fn distance_km(from: &Location, to: &Location, unresolved_km: f64) -> f64 {
    match (from.coordinates(), to.coordinates()) {
        (Some(a), Some(b)) => haversine_km(a, b),
        _ if from.same_place(to) => 0.0,
        _ => unresolved_km,
    }
}

/// Speed needed to cover `distance_km` in `elapsed_hours`.
///
/// Zero or negative elapsed time with a non-zero distance is treated as
/// infinitely fast.
#[must_use]
pub fn required_speed_kmh(distance_km: f64, elapsed_hours: f64) -> f64 {
    if distance_km <= 0.0 {
        0.0
    } else if elapsed_hours <= 0.0 {
        f64::INFINITY
    } else {
        distance_km / elapsed_hours
    }
}
