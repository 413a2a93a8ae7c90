use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

/// Substituted whenever a real position cannot be acquired in time.
pub const FALLBACK_LOCATION: GeoPoint = GeoPoint::new(12.9716, 77.5946);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in meters.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let a = Point::new(self.lng, self.lat);
        let b = Point::new(other.lng, other.lat);
        a.haversine_distance(&b)
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}
