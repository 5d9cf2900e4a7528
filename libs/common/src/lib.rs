pub mod geo;
pub mod id;

pub use geo::{distance_miles, GeoPoint};
