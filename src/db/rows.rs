use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::ambulance::{Ambulance, AmbulanceStatus};
use crate::models::hazard::{AiAnalysis, HazardMessage, MessageKind};
use crate::models::location::GeoPoint;
use crate::models::sos_alert::{SenderInfo, SosAlert, VehicleData};
use crate::models::traffic_signal::{SignalState, TrafficSignal};

#[derive(Debug, FromRow)]
pub struct AlertRow {
    pub id: Uuid,
    pub status: String,
    pub sender_info: Json<SenderInfo>,
    pub lat: f64,
    pub lng: f64,
    pub vehicle_data: Json<VehicleData>,
    pub trigger_method: String,
    pub dispatched_ambulance_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for SosAlert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(SosAlert {
            id: row.id,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            sender_info: row.sender_info.0,
            location: GeoPoint::new(row.lat, row.lng),
            vehicle_data: row.vehicle_data.0,
            trigger_method: row.trigger_method,
            dispatched_ambulance_id: row.dispatched_ambulance_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AmbulanceRow {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    pub status: String,
    pub dest_lat: Option<f64>,
    pub dest_lng: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub unit_type: Option<String>,
}

impl From<AmbulanceRow> for Ambulance {
    fn from(row: AmbulanceRow) -> Self {
        let destination = match (row.dest_lat, row.dest_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };
        Ambulance {
            id: row.id,
            location: GeoPoint::new(row.lat, row.lng),
            status: AmbulanceStatus::parse(&row.status),
            destination,
            speed_kmh: row.speed_kmh,
            unit_type: row.unit_type,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub kind: String,
    pub message: String,
    pub ai_analysis: Option<Json<AiAnalysis>>,
    pub sender_info: Json<SenderInfo>,
    pub lat: f64,
    pub lng: f64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for HazardMessage {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let kind = MessageKind::parse(&row.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown message kind '{}'", row.kind)))?;
        Ok(HazardMessage {
            id: row.id,
            kind,
            message: row.message,
            ai_analysis: row.ai_analysis.map(|j| j.0),
            sender_info: row.sender_info.0,
            location: GeoPoint::new(row.lat, row.lng),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct SignalRow {
    pub id: String,
    pub name: String,
    pub location_label: String,
    pub lat: f64,
    pub lng: f64,
    pub state: String,
}

impl TryFrom<SignalRow> for TrafficSignal {
    type Error = StoreError;

    fn try_from(row: SignalRow) -> Result<Self, Self::Error> {
        let state = SignalState::parse(&row.state)
            .ok_or_else(|| StoreError::Corrupt(format!("signal {} has unknown state '{}'", row.id, row.state)))?;
        Ok(TrafficSignal {
            id: row.id,
            name: row.name,
            location_label: row.location_label,
            coords: GeoPoint::new(row.lat, row.lng),
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::sos_alert::AlertStatus;

    fn alert_row(status: &str) -> AlertRow {
        AlertRow {
            id: Uuid::new_v4(),
            status: status.to_string(),
            sender_info: Json(crate::testing::sender("asha")),
            lat: 12.93,
            lng: 77.62,
            vehicle_data: Json(VehicleData::default()),
            trigger_method: "Manual".to_string(),
            dispatched_ambulance_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn alert_row_maps_status() {
        let alert = SosAlert::try_from(alert_row("dispatched")).unwrap();
        assert_eq!(alert.status, AlertStatus::Dispatched);
        assert_eq!(alert.location, GeoPoint::new(12.93, 77.62));
    }

    #[test]
    fn unknown_alert_status_is_corrupt() {
        assert!(matches!(
            SosAlert::try_from(alert_row("archived")),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn half_destination_is_dropped() {
        let amb = Ambulance::from(AmbulanceRow {
            id: "AMB-1".to_string(),
            lat: 12.9,
            lng: 77.6,
            status: "en-route".to_string(),
            dest_lat: Some(12.8),
            dest_lng: None,
            speed_kmh: None,
            unit_type: None,
        });
        assert_eq!(amb.status, AmbulanceStatus::EnRoute);
        assert!(amb.destination.is_none());
    }
}
