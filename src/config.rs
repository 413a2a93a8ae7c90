use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::location::{GeoPoint, FALLBACK_LOCATION};
use crate::models::position::VehicleKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Consumes vehicle traffic and operator commands, runs the dispatch board.
    Coordinator,
    /// Runs on a vehicle and pushes positions.
    Reporter,
}

impl FromStr for ServiceRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coordinator" => Ok(ServiceRole::Coordinator),
            "reporter" => Ok(ServiceRole::Reporter),
            other => Err(anyhow!("unknown SERVICE_ROLE '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => Err(anyhow!("unknown STORE_BACKEND '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service_role: ServiceRole,
    pub store_backend: StoreBackend,
    pub kafka_bootstrap_servers: String,
    pub kafka_position_topic: String,
    pub kafka_event_topic: String,
    pub kafka_group_id: String,
    pub kafka_auto_offset_reset: String,
    pub kafka_sasl_mechanism: String,
    pub kafka_username: String,
    pub kafka_password: String,
    pub kafka_security_protocol: String,
    pub kafka_max_retries: u32,
    pub kafka_circuit_breaker_cooldown: u64,
    pub database_url: String,
    pub log_level: String,
    pub vehicle_id: String,
    pub vehicle_kind: VehicleKind,
    pub vehicle_username: String,
    pub vehicle_reg_number: Option<String>,
    pub report_interval_secs: u64,
    pub geolocation_timeout_secs: u64,
    pub fallback_location: GeoPoint,
    /// Fixed position to report, for vehicles without a live position source.
    pub static_location: Option<GeoPoint>,
    pub default_ambulance_speed_kmh: f64,
    pub feed_limit: usize,
    pub sos_confirm_countdown_secs: u64,
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_point(lat_key: &str, lng_key: &str) -> Option<GeoPoint> {
    let lat = env::var(lat_key).ok()?.trim().parse().ok()?;
    let lng = env::var(lng_key).ok()?.trim().parse().ok()?;
    Some(GeoPoint::new(lat, lng)).filter(GeoPoint::is_valid)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let service_role = env::var("SERVICE_ROLE")
            .unwrap_or_else(|_| "coordinator".to_string())
            .parse()?;
        let store_backend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()?;

        let kafka_bootstrap_servers =
            env::var("KAFKA_BOOTSTRAP_SERVERS").unwrap_or_else(|_| "localhost:9092".to_string());
        let kafka_position_topic =
            env::var("KAFKA_POSITION_TOPIC").unwrap_or_else(|_| "vehicle-positions".to_string());
        let kafka_event_topic = env::var("KAFKA_EVENT_TOPIC").unwrap_or_else(|_| "sos-events".to_string());
        let kafka_group_id =
            env::var("KAFKA_GROUP_ID").unwrap_or_else(|_| "sos-dispatch-coordinator".to_string());
        let kafka_auto_offset_reset =
            env::var("KAFKA_AUTO_OFFSET_RESET").unwrap_or_else(|_| "latest".to_string());
        let kafka_sasl_mechanism =
            env::var("KAFKA_SASL_MECHANISM").unwrap_or_else(|_| "SCRAM-SHA-256".to_string());
        let kafka_username = env::var("KAFKA_USERNAME").unwrap_or_default();
        let kafka_password = env::var("KAFKA_PASSWORD").unwrap_or_default();
        let kafka_security_protocol =
            env::var("KAFKA_SECURITY_PROTOCOL").unwrap_or_else(|_| "SASL_PLAINTEXT".to_string());
        let kafka_max_retries = parse_or("KAFKA_MAX_RETRIES", 5);
        let kafka_circuit_breaker_cooldown = parse_or("KAFKA_CIRCUIT_BREAKER_COOLDOWN", 300);

        let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let db_name = env::var("DB_DATABASE").unwrap_or_else(|_| "sos_dispatch".to_string());
        let db_user = env::var("DB_USER").unwrap_or_else(|_| "sos".to_string());
        let db_pwd = env::var("DB_PWD").unwrap_or_else(|_| "sos".to_string());

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let vehicle_id = env::var("VEHICLE_ID").unwrap_or_else(|_| "EV-001".to_string());
        let vehicle_kind = match env::var("VEHICLE_KIND") {
            Ok(v) => VehicleKind::parse(&v).ok_or_else(|| anyhow!("unknown VEHICLE_KIND '{}'", v))?,
            Err(_) => VehicleKind::Passenger,
        };
        let vehicle_username = env::var("VEHICLE_USERNAME").unwrap_or_else(|_| vehicle_id.clone());
        let vehicle_reg_number = env::var("VEHICLE_REG_NUMBER").ok().filter(|s| !s.trim().is_empty());

        Ok(Self {
            service_role,
            store_backend,
            kafka_bootstrap_servers,
            kafka_position_topic,
            kafka_event_topic,
            kafka_group_id,
            kafka_auto_offset_reset,
            kafka_sasl_mechanism,
            kafka_username,
            kafka_password,
            kafka_security_protocol,
            kafka_max_retries,
            kafka_circuit_breaker_cooldown,
            database_url,
            log_level,
            vehicle_id,
            vehicle_kind,
            vehicle_username,
            vehicle_reg_number,
            report_interval_secs: parse_or::<u64>("REPORT_INTERVAL_SECS", 5).max(1),
            geolocation_timeout_secs: parse_or("GEOLOCATION_TIMEOUT_SECS", 10),
            fallback_location: parse_point("FALLBACK_LAT", "FALLBACK_LNG").unwrap_or(FALLBACK_LOCATION),
            static_location: parse_point("VEHICLE_LAT", "VEHICLE_LNG"),
            default_ambulance_speed_kmh: parse_or("DEFAULT_AMBULANCE_SPEED_KMH", 50.0),
            feed_limit: parse_or("FEED_LIMIT", 10),
            sos_confirm_countdown_secs: parse_or("SOS_CONFIRM_COUNTDOWN_SECS", 15),
        })
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.geolocation_timeout_secs)
    }

    pub fn sos_confirm_countdown(&self) -> Duration {
        Duration::from_secs(self.sos_confirm_countdown_secs)
    }
}
