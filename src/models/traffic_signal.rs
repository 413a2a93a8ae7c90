use serde::{Deserialize, Serialize};

use super::location::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalState {
    Red,
    Yellow,
    Green,
}

impl SignalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalState::Red => "red",
            SignalState::Yellow => "yellow",
            SignalState::Green => "green",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "red" => Some(SignalState::Red),
            "yellow" => Some(SignalState::Yellow),
            "green" => Some(SignalState::Green),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSignal {
    pub id: String,
    pub name: String,
    /// Human-readable cross streets.
    #[serde(rename = "location")]
    pub location_label: String,
    pub coords: GeoPoint,
    pub state: SignalState,
}

/// Seeded into an empty signal keyspace so the map is never blank.
pub fn default_signals() -> Vec<TrafficSignal> {
    let signal = |id: &str, name: &str, label: &str, lat: f64, lng: f64, state| TrafficSignal {
        id: id.to_string(),
        name: name.to_string(),
        location_label: label.to_string(),
        coords: GeoPoint::new(lat, lng),
        state,
    };
    vec![
        signal("signal_1", "MG Road Junction", "MG Road & Brigade Road", 12.9716, 77.5946, SignalState::Green),
        signal("signal_2", "Koramangala Signal", "80 Feet Road", 12.9279, 77.6271, SignalState::Red),
        signal("signal_3", "Indiranagar Junction", "100 Feet Road", 12.9719, 77.6412, SignalState::Yellow),
        signal("signal_4", "Whitefield Main Road", "ITPL Main Road", 12.9698, 77.75, SignalState::Green),
        signal("signal_5", "Electronic City", "Hosur Road", 12.8456, 77.6603, SignalState::Red),
    ]
}
