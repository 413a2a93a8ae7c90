//! Wire format for periodic position pushes. These are high volume, so they
//! travel as protobuf rather than JSON.

use chrono::{DateTime, TimeZone, Utc};

use super::location::GeoPoint;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum VehicleKind {
    Unspecified = 0,
    Ambulance = 1,
    Passenger = 2,
}

impl VehicleKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ambulance" => Some(VehicleKind::Ambulance),
            "passenger" | "ev" => Some(VehicleKind::Passenger),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PositionFrame {
    #[prost(string, tag = "1")]
    pub vehicle_id: String,
    #[prost(enumeration = "VehicleKind", tag = "2")]
    pub kind: i32,
    #[prost(double, tag = "3")]
    pub lat: f64,
    #[prost(double, tag = "4")]
    pub lng: f64,
    #[prost(double, optional, tag = "5")]
    pub speed_kmh: Option<f64>,
    #[prost(int64, tag = "6")]
    pub recorded_at_ms: i64,
    /// Set when the position came from the fallback rather than a real fix.
    #[prost(bool, tag = "7")]
    pub is_fallback: bool,
}

impl PositionFrame {
    pub fn new(vehicle_id: impl Into<String>, kind: VehicleKind, location: GeoPoint) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            kind: kind as i32,
            lat: location.lat,
            lng: location.lng,
            speed_kmh: None,
            recorded_at_ms: Utc::now().timestamp_millis(),
            is_fallback: false,
        }
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.recorded_at_ms).single()
    }
}
