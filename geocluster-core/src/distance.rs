use crate::constants::{EARTH_RADIUS_M, WORLD_LAT_MAX, WORLD_LON_MAX};

/// Great-circle distance in meters between two points given in decimal degrees.
///
/// No validation: out-of-range input gives a meaningless but finite-or-NaN
/// result, never a panic.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1.0 for antipodal points.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();
    EARTH_RADIUS_M * c
}

pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-WORLD_LAT_MAX..=WORLD_LAT_MAX).contains(&lat)
        && (-WORLD_LON_MAX..=WORLD_LON_MAX).contains(&lon)
}
