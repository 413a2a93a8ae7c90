use std::fmt;

use serde::{Deserialize, Serialize};

use super::location::GeoPoint;

/// Fleet-average speed assumed when a unit does not report one.
pub const DEFAULT_SPEED_KMH: f64 = 50.0;

/// Any status string we do not recognise reads as `Unavailable`, so a unit in
/// an unknown state is never offered for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AmbulanceStatus {
    Available,
    EnRoute,
    Unavailable,
}

impl AmbulanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmbulanceStatus::Available => "available",
            AmbulanceStatus::EnRoute => "en-route",
            AmbulanceStatus::Unavailable => "unavailable",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => AmbulanceStatus::Available,
            "en-route" | "en_route" | "enroute" => AmbulanceStatus::EnRoute,
            _ => AmbulanceStatus::Unavailable,
        }
    }
}

impl From<String> for AmbulanceStatus {
    fn from(s: String) -> Self {
        AmbulanceStatus::parse(&s)
    }
}

impl From<AmbulanceStatus> for String {
    fn from(s: AmbulanceStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for AmbulanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ambulance {
    pub id: String,
    pub location: GeoPoint,
    pub status: AmbulanceStatus,
    #[serde(default)]
    pub destination: Option<GeoPoint>,
    #[serde(default, rename = "speed")]
    pub speed_kmh: Option<f64>,
    #[serde(default, rename = "type")]
    pub unit_type: Option<String>,
}

impl Ambulance {
    pub fn new(id: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            id: id.into(),
            location,
            status: AmbulanceStatus::Available,
            destination: None,
            speed_kmh: None,
            unit_type: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == AmbulanceStatus::Available
    }

    pub fn distance_to(&self, point: &GeoPoint) -> f64 {
        self.location.distance_m(point)
    }

    /// Minutes until this unit reaches `point` at its reported speed, or the
    /// given fleet default when it reports none.
    pub fn eta_minutes_to(&self, point: &GeoPoint, default_speed_kmh: f64) -> Option<u32> {
        eta_minutes(
            self.distance_to(point),
            self.speed_kmh.unwrap_or(default_speed_kmh),
        )
    }
}

pub fn eta_minutes(distance_m: f64, speed_kmh: f64) -> Option<u32> {
    if !(speed_kmh > 0.0) || !distance_m.is_finite() {
        return None;
    }
    let speed_mps = speed_kmh * 1000.0 / 3600.0;
    let minutes = (distance_m / speed_mps / 60.0).ceil();
    Some(minutes.max(0.0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_never_available() {
        let amb: Ambulance = serde_json::from_str(
            r#"{ "id": "AMB-7", "location": { "lat": 12.9, "lng": 77.6 }, "status": "returning", "type": "Advanced Life Support" }"#,
        )
        .unwrap();
        assert_eq!(amb.status, AmbulanceStatus::Unavailable);
        assert!(!amb.is_available());
        assert_eq!(amb.unit_type.as_deref(), Some("Advanced Life Support"));
    }

    #[test]
    fn en_route_serializes_with_hyphen() {
        let mut amb = Ambulance::new("AMB-1", GeoPoint::new(12.9, 77.6));
        amb.status = AmbulanceStatus::EnRoute;
        let json = serde_json::to_value(&amb).unwrap();
        assert_eq!(json["status"], "en-route");
    }

    #[test]
    fn eta_rounds_up_and_uses_fleet_default() {
        // 4 km at 50 km/h is 4.8 minutes.
        assert_eq!(eta_minutes(4_000.0, 50.0), Some(5));
        assert_eq!(eta_minutes(5_010.0, 50.0), Some(7));
        assert_eq!(eta_minutes(1_000.0, 0.0), None);

        let amb = Ambulance::new("AMB-2", GeoPoint::new(12.9716, 77.5946));
        let here = GeoPoint::new(12.9716, 77.5946);
        assert_eq!(amb.eta_minutes_to(&here, DEFAULT_SPEED_KMH), Some(0));
    }
}
