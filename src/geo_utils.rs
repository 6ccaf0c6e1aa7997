//! Geographic helpers: haversine distance and coordinate rounding.
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees),
//! the standard used by GPS receivers.

use geo::{Distance, Haversine, Point};

/// Great-circle distance between two coordinates in kilometers.
///
/// Uses the haversine formula on a spherical Earth, accurate to within 0.3%
/// for trajectory-scale distances.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let a = Point::new(lon1, lat1);
    let b = Point::new(lon2, lat2);
    Haversine::distance(a, b) / 1000.0
}

/// Total haversine length of a coordinate sequence in kilometers.
/// Consecutive pairs only; an empty or single-point slice has length zero.
pub fn path_length_km(coords: &[(f64, f64)]) -> f64 {
    coords
        .windows(2)
        .map(|w| haversine_km(w[0].0, w[0].1, w[1].0, w[1].1))
        .sum()
}

/// Round a coordinate to 3 decimal places, expressed in milli-degrees so the
/// comparison is an integer equality rather than a float one.
fn milli(value: f64) -> i64 {
    (value * 1000.0).round() as i64
}

/// True iff `value` rounded to 3 decimal places equals `reference` rounded
/// to 3 decimal places.
pub fn round3_eq(value: f64, reference: f64) -> bool {
    milli(value) == milli(reference)
}
