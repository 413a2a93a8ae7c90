use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::location::GeoPoint;

/// Real-time store path holding the current corridor.
pub const CORRIDOR_PATH: &str = "green_corridor";
/// Real-time store path holding the latest corridor notice.
pub const CORRIDOR_NOTICE_PATH: &str = "notifications/green_corridor";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GreenCorridor {
    pub active: bool,
    #[serde(default)]
    pub ambulance_location: Option<GeoPoint>,
    #[serde(default)]
    pub sos_location: Option<GeoPoint>,
}

impl GreenCorridor {
    pub fn active(ambulance_location: GeoPoint, sos_location: GeoPoint) -> Self {
        Self {
            active: true,
            ambulance_location: Some(ambulance_location),
            sos_location: Some(sos_location),
        }
    }

    pub fn inactive() -> Self {
        Self {
            active: false,
            ambulance_location: None,
            sos_location: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeKind {
    #[serde(rename = "green_corridor_active")]
    Active,
    #[serde(rename = "green_corridor_deactivated")]
    Deactivated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorridorNotice {
    #[serde(rename = "type")]
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}
