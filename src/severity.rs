//! Incident severity scoring.
//!
//! Two independent paths feed the same three tiers. Crash telemetry is scored
//! additively and banded. Object-detection output is a weighted sum clamped
//! to 0–10. Both are pure functions of their inputs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::hazard::Detection;
use crate::models::sos_alert::{CrashTelemetry, SosAlert};

/// Vision scores strictly above this escalate to a confirmable SOS.
pub const VISION_SOS_THRESHOLD: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeverityTier {
    Low,
    Medium,
    High,
}

impl SeverityTier {
    pub fn from_telemetry_score(score: u8) -> Self {
        if score >= 7 {
            SeverityTier::High
        } else if score >= 4 {
            SeverityTier::Medium
        } else {
            SeverityTier::Low
        }
    }

    pub fn from_vision_score(score: u8) -> Self {
        if score <= 3 {
            SeverityTier::Low
        } else if score <= VISION_SOS_THRESHOLD {
            SeverityTier::Medium
        } else {
            SeverityTier::High
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SeverityTier::Low => "Low",
            SeverityTier::Medium => "Medium",
            SeverityTier::High => "High",
        };
        f.write_str(s)
    }
}

pub fn telemetry_score(g_force: f64, delta_v: f64, airbags_deployed: bool, rollover_detected: bool) -> u8 {
    let mut score = 0;
    if g_force > 4.5 {
        score += 4;
    } else if g_force > 2.5 {
        score += 2;
    }
    if delta_v > 40.0 {
        score += 3;
    } else if delta_v > 20.0 {
        score += 1;
    }
    if airbags_deployed {
        score += 3;
    }
    if rollover_detected {
        score += 5;
    }
    score
}

pub fn classify(g_force: f64, delta_v: f64, airbags_deployed: bool, rollover_detected: bool) -> SeverityTier {
    SeverityTier::from_telemetry_score(telemetry_score(
        g_force,
        delta_v,
        airbags_deployed,
        rollover_detected,
    ))
}

/// Missing or partial telemetry classifies as `Medium`: we fail toward
/// caution, never toward dismissal.
pub fn classify_telemetry(crash: Option<&CrashTelemetry>) -> SeverityTier {
    match crash {
        Some(CrashTelemetry {
            g_force: Some(g),
            delta_v: Some(dv),
            airbags_deployed,
            rollover_detected,
        }) => classify(*g, *dv, *airbags_deployed, *rollover_detected),
        _ => SeverityTier::Medium,
    }
}

pub fn classify_alert(alert: &SosAlert) -> SeverityTier {
    classify_telemetry(alert.crash())
}

/// Hazard weight for a detection class, if it is one we score.
pub fn class_weight(class: &str) -> Option<f64> {
    let weight = match normalize_class(class).as_str() {
        "car" => 3.0,
        "truck" => 5.0,
        "bus" => 6.0,
        "motorcycle" => 2.0,
        "bicycle" => 1.0,
        "person" => 10.0,
        "ambulance" => 8.0,
        "police car" => 7.0,
        "fire truck" => 8.0,
        "fire hydrant" => 1.0,
        "stop sign" => 1.0,
        "traffic light" => 1.0,
        _ => return None,
    };
    Some(weight)
}

fn is_vehicle_class(class: &str) -> bool {
    matches!(
        normalize_class(class).as_str(),
        "car" | "truck" | "bus" | "motorcycle" | "ambulance" | "police car" | "fire truck"
    )
}

fn normalize_class(class: &str) -> String {
    class.trim().to_ascii_lowercase().replace('_', " ")
}

pub fn score_detections(detections: &[Detection]) -> u8 {
    let mut score = 0.0;
    let mut vehicle_count = 0u32;
    let mut person_detected = false;

    for detection in detections {
        let Some(weight) = class_weight(&detection.class) else {
            continue;
        };
        let confidence = if detection.score.is_finite() {
            detection.score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        score += weight * confidence;
        if is_vehicle_class(&detection.class) {
            vehicle_count += 1;
        }
        if normalize_class(&detection.class) == "person" {
            person_detected = true;
        }
    }

    if vehicle_count > 1 {
        score += f64::from(vehicle_count) * 2.0;
    }
    if person_detected {
        score *= 1.5;
    }

    score.round().min(10.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisionRoute {
    /// Severe enough to raise an SOS once the reporter confirms.
    ConfirmSos,
    /// Logged to the hazard feed only; no SOS record is created.
    HazardOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisionAssessment {
    pub score: u8,
    pub tier: SeverityTier,
    pub route: VisionRoute,
}

pub fn assess_detections(detections: &[Detection]) -> VisionAssessment {
    let score = score_detections(detections);
    let route = if score > VISION_SOS_THRESHOLD {
        VisionRoute::ConfirmSos
    } else {
        VisionRoute::HazardOnly
    };
    VisionAssessment {
        score,
        tier: SeverityTier::from_vision_score(score),
        route,
    }
}
