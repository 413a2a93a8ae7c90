use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::GeoPoint;
use super::sos_alert::SenderInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Hazard,
    Custom,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Hazard => "hazard",
            MessageKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hazard" => Some(MessageKind::Hazard),
            "custom" => Some(MessageKind::Custom),
            _ => None,
        }
    }
}

/// One labeled box from the object-detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    /// Confidence in `[0, 1]`.
    pub score: f64,
    /// `[x, y, width, height]` in image pixels.
    #[serde(default)]
    pub bbox: [f64; 4],
}

impl Detection {
    pub fn new(class: impl Into<String>, score: f64) -> Self {
        Self {
            class: class.into(),
            score,
            bbox: [0.0; 4],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub severity: u8,
    pub detections: Vec<Detection>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardMessage {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub message: String,
    #[serde(default)]
    pub ai_analysis: Option<AiAnalysis>,
    pub sender_info: SenderInfo,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHazardMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub message: String,
    #[serde(default)]
    pub ai_analysis: Option<AiAnalysis>,
    pub sender_info: SenderInfo,
    pub location: GeoPoint,
}

impl NewHazardMessage {
    pub fn into_message(self, id: Uuid, created_at: DateTime<Utc>) -> HazardMessage {
        HazardMessage {
            id,
            kind: self.kind,
            message: self.message,
            ai_analysis: self.ai_analysis,
            sender_info: self.sender_info,
            location: self.location,
            created_at,
        }
    }
}
