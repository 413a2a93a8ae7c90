//! Fixtures shared by unit tests.

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::models::ambulance::Ambulance;
use crate::models::location::GeoPoint;
use crate::models::sos_alert::{AlertStatus, CrashTelemetry, NewSosAlert, SenderInfo, SosAlert, VehicleData};

pub fn sender(username: &str) -> SenderInfo {
    SenderInfo {
        user_id: format!("user-{}", username),
        username: username.to_string(),
        reg_number: Some(format!("KA-01-{}", username.to_ascii_uppercase())),
    }
}

pub fn crash(g_force: f64, delta_v: f64, airbags: bool, rollover: bool) -> CrashTelemetry {
    CrashTelemetry {
        g_force: Some(g_force),
        delta_v: Some(delta_v),
        airbags_deployed: airbags,
        rollover_detected: rollover,
    }
}

pub fn high() -> Option<CrashTelemetry> {
    Some(crash(5.0, 45.0, true, false))
}

pub fn low() -> Option<CrashTelemetry> {
    Some(crash(1.0, 5.0, false, false))
}

pub fn new_sos(username: &str, at: GeoPoint, telemetry: Option<CrashTelemetry>) -> NewSosAlert {
    NewSosAlert {
        id: None,
        sender_info: sender(username),
        location: at,
        vehicle_data: VehicleData {
            battery: Some(85),
            passengers: Some(1),
            vitals: Some(80),
            crash: telemetry,
        },
        trigger_method: "Manual".to_string(),
    }
}

/// An active alert created `seq` seconds after a fixed epoch.
pub fn alert(seq: i64, at: GeoPoint, telemetry: Option<CrashTelemetry>) -> SosAlert {
    let base = Utc.with_ymd_and_hms(2025, 11, 29, 6, 0, 0).unwrap();
    let mut alert = new_sos(&format!("driver{}", seq), at, telemetry)
        .into_alert(Uuid::new_v4(), base + Duration::seconds(seq));
    alert.status = AlertStatus::Active;
    alert
}

pub fn ambulance(id: &str, at: GeoPoint) -> Ambulance {
    Ambulance::new(id, at)
}
