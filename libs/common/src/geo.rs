//! Great-circle distance between two coordinates.

use serde::{Deserialize, Serialize};

/// Mean earth radius in statute miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Haversine distance in whole miles.
///
/// Returns `None` ("unknown") when either point is missing or the result is
/// not a finite positive number. Identical points are unknown, not zero.
pub fn distance_miles(from: Option<GeoPoint>, to: Option<GeoPoint>) -> Option<u32> {
    let (from, to) = (from?, to?);

    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    let miles = (EARTH_RADIUS_MILES * c).round();

    if !miles.is_finite() || miles <= 0.0 {
        return None;
    }
    Some(miles as u32)
}
