use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::location::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Dispatched,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Dispatched => "dispatched",
            AlertStatus::Resolved => "resolved",
        }
    }

    /// Status only moves forward: active -> dispatched -> resolved.
    /// An operator may also clear an active alert straight to resolved.
    pub fn can_transition_to(self, next: AlertStatus) -> bool {
        matches!(
            (self, next),
            (AlertStatus::Active, AlertStatus::Dispatched)
                | (AlertStatus::Active, AlertStatus::Resolved)
                | (AlertStatus::Dispatched, AlertStatus::Resolved)
        )
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "dispatched" => Ok(AlertStatus::Dispatched),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("unknown alert status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderInfo {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub reg_number: Option<String>,
}

/// Crash sensor readings. Gateways send numbers as strings as often as not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrashTelemetry {
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub g_force: Option<f64>,
    #[serde(default, deserialize_with = "parse_f64_option")]
    pub delta_v: Option<f64>,
    #[serde(default)]
    pub airbags_deployed: bool,
    #[serde(default)]
    pub rollover_detected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleData {
    #[serde(default)]
    pub battery: Option<u32>,
    #[serde(default)]
    pub passengers: Option<u32>,
    /// Driver heart rate in bpm.
    #[serde(default)]
    pub vitals: Option<u32>,
    #[serde(default)]
    pub crash: Option<CrashTelemetry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosAlert {
    pub id: Uuid,
    pub status: AlertStatus,
    pub sender_info: SenderInfo,
    pub location: GeoPoint,
    #[serde(default)]
    pub vehicle_data: VehicleData,
    pub trigger_method: String,
    #[serde(default)]
    pub dispatched_ambulance_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SosAlert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    pub fn crash(&self) -> Option<&CrashTelemetry> {
        self.vehicle_data.crash.as_ref()
    }
}

/// An SOS as raised by a vehicle. A vehicle that wants to follow its own
/// alert picks the id up front; redelivering the same id creates nothing new.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSosAlert {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub sender_info: SenderInfo,
    pub location: GeoPoint,
    #[serde(default)]
    pub vehicle_data: VehicleData,
    pub trigger_method: String,
}

impl NewSosAlert {
    pub fn into_alert(self, id: Uuid, created_at: DateTime<Utc>) -> SosAlert {
        SosAlert {
            id,
            status: AlertStatus::Active,
            sender_info: self.sender_info,
            location: self.location,
            vehicle_data: self.vehicle_data,
            trigger_method: self.trigger_method,
            dispatched_ambulance_id: None,
            created_at,
        }
    }
}

fn parse_f64_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrFloat {
        String(String),
        Float(f64),
    }

    let v: Option<StringOrFloat> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrFloat::Float(f)) => Ok(Some(f)),
        Some(StringOrFloat::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<f64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}
