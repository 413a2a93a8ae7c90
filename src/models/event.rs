use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ambulance::Ambulance;
use super::hazard::AiAnalysis;
use super::location::GeoPoint;
use super::sos_alert::{NewSosAlert, SenderInfo};
use super::traffic_signal::SignalState;

/// Free text posted to the live feed by a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPost {
    pub sender_info: SenderInfo,
    pub location: GeoPoint,
    pub message: String,
    #[serde(default)]
    pub ai_analysis: Option<AiAnalysis>,
}

/// Everything carried on the JSON event topic: vehicle-originated events and
/// operator commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Sos(NewSosAlert),
    Hazard(FeedPost),
    Custom(FeedPost),
    Dispatch {
        alert_id: Uuid,
        ambulance_id: String,
    },
    Resolve {
        alert_id: Uuid,
    },
    ReleaseAmbulance {
        ambulance_id: String,
    },
    /// Nested so the unit's own `type` field cannot clash with the event tag.
    RegisterAmbulance {
        ambulance: Ambulance,
    },
    SetTrafficSignal {
        signal_id: String,
        state: SignalState,
    },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Sos(_) => "sos",
            StreamEvent::Hazard(_) => "hazard",
            StreamEvent::Custom(_) => "custom",
            StreamEvent::Dispatch { .. } => "dispatch",
            StreamEvent::Resolve { .. } => "resolve",
            StreamEvent::ReleaseAmbulance { .. } => "release_ambulance",
            StreamEvent::RegisterAmbulance { .. } => "register_ambulance",
            StreamEvent::SetTrafficSignal { .. } => "set_traffic_signal",
        }
    }
}
