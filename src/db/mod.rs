use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dispatch::matcher::DISPATCH_BOARD_PATH;
use crate::dispatch::DispatchBoard;
use crate::error::{ConflictReason, DispatchError, StoreError};
use crate::models::ambulance::Ambulance;
use crate::models::corridor::{CorridorNotice, GreenCorridor, CORRIDOR_NOTICE_PATH, CORRIDOR_PATH};
use crate::models::hazard::{HazardMessage, NewHazardMessage};
use crate::models::location::GeoPoint;
use crate::models::sos_alert::{AlertStatus, NewSosAlert, SosAlert};
use crate::models::traffic_signal::{SignalState, TrafficSignal};
use crate::store::{
    ChangeFeed, ChangeRecord, DispatchLedger, DispatchReceipt, DocumentStore, RealtimeStore, ResolveOutcome,
    SubscriptionHandle, CHANGE_FEED_CAPACITY,
};

pub mod listener;
pub mod queries;
pub mod rows;

use rows::{AlertRow, AmbulanceRow, MessageRow, SignalRow};

pub type DbPool = Pool<Postgres>;

pub async fn init_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(50)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Both stores on one Postgres database. Change feeds are driven by the
/// table triggers, so writes from other processes show up too once
/// `spawn_listener` is running.
pub struct PgStore {
    pool: DbPool,
    alerts_tx: broadcast::Sender<ChangeRecord>,
    ambulances_tx: broadcast::Sender<ChangeRecord>,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        let (alerts_tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let (ambulances_tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            pool,
            alerts_tx,
            ambulances_tx,
        }
    }

    pub fn spawn_listener(&self) -> SubscriptionHandle {
        listener::spawn(self.pool.clone(), self.alerts_tx.clone(), self.ambulances_tx.clone())
    }

    async fn value<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let row = sqlx::query(queries::SELECT_VALUE)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let Json(value): Json<T> = row.try_get("value")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put_value<T: Serialize + Sync>(&self, path: &str, value: &T) -> Result<(), StoreError> {
        sqlx::query(queries::UPSERT_VALUE)
            .bind(path)
            .bind(Json(value))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ambulance_row(&self, id: &str) -> Result<Option<Ambulance>, StoreError> {
        let row: Option<AmbulanceRow> = sqlx::query_as(queries::SELECT_AMBULANCE)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Ambulance::from))
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn create_alert(&self, alert: NewSosAlert) -> Result<SosAlert, StoreError> {
        let id = alert.id.unwrap_or_else(Uuid::new_v4);
        let mut tx = self.pool.begin().await?;

        sqlx::query(queries::UPSERT_ALERT_SENDER)
            .bind(&alert.sender_info.user_id)
            .bind(&alert.sender_info.username)
            .bind(&alert.sender_info.reg_number)
            .execute(&mut *tx)
            .await?;

        // A redelivered SOS with a known id leaves the stored alert as it is.
        sqlx::query(queries::INSERT_ALERT)
            .bind(id)
            .bind(Json(&alert.sender_info))
            .bind(alert.location.lat)
            .bind(alert.location.lng)
            .bind(Json(&alert.vehicle_data))
            .bind(&alert.trigger_method)
            .execute(&mut *tx)
            .await?;

        let row: AlertRow = sqlx::query_as(queries::SELECT_ALERT)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        SosAlert::try_from(row)
    }

    async fn alert(&self, id: Uuid) -> Result<Option<SosAlert>, StoreError> {
        let row: Option<AlertRow> = sqlx::query_as(queries::SELECT_ALERT)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SosAlert::try_from).transpose()
    }

    async fn active_alerts(&self) -> Result<Vec<SosAlert>, StoreError> {
        let rows: Vec<AlertRow> = sqlx::query_as(queries::SELECT_ACTIVE_ALERTS)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(SosAlert::try_from).collect()
    }

    async fn append_message(&self, message: NewHazardMessage) -> Result<HazardMessage, StoreError> {
        let row: MessageRow = sqlx::query_as(queries::INSERT_MESSAGE)
            .bind(Uuid::new_v4())
            .bind(message.kind.as_str())
            .bind(&message.message)
            .bind(message.ai_analysis.as_ref().map(Json))
            .bind(Json(&message.sender_info))
            .bind(message.location.lat)
            .bind(message.location.lng)
            .fetch_one(&self.pool)
            .await?;
        HazardMessage::try_from(row)
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<HazardMessage>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(queries::SELECT_RECENT_MESSAGES)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(HazardMessage::try_from).collect()
    }

    async fn update_user_location(&self, user_id: &str, location: GeoPoint) -> Result<(), StoreError> {
        sqlx::query(queries::UPSERT_USER_LOCATION)
            .bind(user_id)
            .bind(location.lat)
            .bind(location.lng)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn subscribe_alerts(&self) -> ChangeFeed {
        self.alerts_tx.subscribe()
    }
}

#[async_trait]
impl RealtimeStore for PgStore {
    async fn ambulances(&self) -> Result<Vec<Ambulance>, StoreError> {
        let rows: Vec<AmbulanceRow> = sqlx::query_as(queries::SELECT_AMBULANCES)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Ambulance::from).collect())
    }

    async fn ambulance(&self, id: &str) -> Result<Option<Ambulance>, StoreError> {
        self.ambulance_row(id).await
    }

    async fn register_ambulance(&self, ambulance: Ambulance) -> Result<(), StoreError> {
        sqlx::query(queries::UPSERT_AMBULANCE)
            .bind(&ambulance.id)
            .bind(ambulance.location.lat)
            .bind(ambulance.location.lng)
            .bind(ambulance.status.as_str())
            .bind(ambulance.destination.map(|d| d.lat))
            .bind(ambulance.destination.map(|d| d.lng))
            .bind(ambulance.speed_kmh)
            .bind(&ambulance.unit_type)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_ambulance_position(
        &self,
        id: &str,
        location: GeoPoint,
        speed_kmh: Option<f64>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(queries::UPDATE_AMBULANCE_POSITION)
            .bind(id)
            .bind(location.lat)
            .bind(location.lng)
            .bind(speed_kmh)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn traffic_signals(&self) -> Result<Vec<TrafficSignal>, StoreError> {
        let rows: Vec<SignalRow> = sqlx::query_as(queries::SELECT_SIGNALS)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TrafficSignal::try_from).collect()
    }

    async fn put_traffic_signal(&self, signal: TrafficSignal) -> Result<(), StoreError> {
        sqlx::query(queries::UPSERT_SIGNAL)
            .bind(&signal.id)
            .bind(&signal.name)
            .bind(&signal.location_label)
            .bind(signal.coords.lat)
            .bind(signal.coords.lng)
            .bind(signal.state.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_signal_state(&self, id: &str, state: SignalState) -> Result<bool, StoreError> {
        let result = sqlx::query(queries::UPDATE_SIGNAL_STATE)
            .bind(id)
            .bind(state.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn corridor(&self) -> Result<Option<GreenCorridor>, StoreError> {
        self.value(CORRIDOR_PATH).await
    }

    async fn put_corridor(&self, corridor: &GreenCorridor) -> Result<(), StoreError> {
        self.put_value(CORRIDOR_PATH, corridor).await
    }

    async fn corridor_notice(&self) -> Result<Option<CorridorNotice>, StoreError> {
        self.value(CORRIDOR_NOTICE_PATH).await
    }

    async fn put_corridor_notice(&self, notice: &CorridorNotice) -> Result<(), StoreError> {
        self.put_value(CORRIDOR_NOTICE_PATH, notice).await
    }

    async fn dispatch_board(&self) -> Result<Option<DispatchBoard>, StoreError> {
        self.value(DISPATCH_BOARD_PATH).await
    }

    async fn put_dispatch_board(&self, board: &DispatchBoard) -> Result<(), StoreError> {
        self.put_value(DISPATCH_BOARD_PATH, board).await
    }

    fn subscribe_ambulances(&self) -> ChangeFeed {
        self.ambulances_tx.subscribe()
    }
}

#[async_trait]
impl DispatchLedger for PgStore {
    async fn commit_dispatch(&self, alert_id: Uuid, ambulance_id: &str) -> Result<DispatchReceipt, DispatchError> {
        let mut tx = self.pool.begin().await?;

        // Always alert first, then ambulance, so concurrent commits cannot deadlock.
        let alert: Option<AlertRow> = sqlx::query_as(queries::SELECT_ALERT_FOR_UPDATE)
            .bind(alert_id)
            .fetch_optional(&mut *tx)
            .await?;
        let alert = SosAlert::try_from(alert.ok_or(DispatchError::AlertNotFound(alert_id))?)?;
        if !alert.status.can_transition_to(AlertStatus::Dispatched) {
            return Err(DispatchError::Conflict(ConflictReason::AlertNotActive {
                alert_id,
                status: alert.status,
            }));
        }

        let ambulance: Option<AmbulanceRow> = sqlx::query_as(queries::SELECT_AMBULANCE_FOR_UPDATE)
            .bind(ambulance_id)
            .fetch_optional(&mut *tx)
            .await?;
        let ambulance = Ambulance::from(
            ambulance.ok_or_else(|| DispatchError::AmbulanceNotFound(ambulance_id.to_string()))?,
        );
        if !ambulance.is_available() {
            return Err(DispatchError::Conflict(ConflictReason::AmbulanceUnavailable {
                ambulance_id: ambulance_id.to_string(),
                status: ambulance.status,
            }));
        }

        let ambulance: AmbulanceRow = sqlx::query_as(queries::UPDATE_AMBULANCE_EN_ROUTE)
            .bind(ambulance_id)
            .bind(alert.location.lat)
            .bind(alert.location.lng)
            .fetch_one(&mut *tx)
            .await?;
        let alert: AlertRow = sqlx::query_as(queries::UPDATE_ALERT_DISPATCHED)
            .bind(alert_id)
            .bind(ambulance_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(DispatchReceipt {
            alert: SosAlert::try_from(alert)?,
            ambulance: Ambulance::from(ambulance),
        })
    }

    async fn resolve_alert(&self, alert_id: Uuid) -> Result<ResolveOutcome, DispatchError> {
        let mut tx = self.pool.begin().await?;
        let current: Option<AlertRow> = sqlx::query_as(queries::SELECT_ALERT_FOR_UPDATE)
            .bind(alert_id)
            .fetch_optional(&mut *tx)
            .await?;
        let current = SosAlert::try_from(current.ok_or(DispatchError::AlertNotFound(alert_id))?)?;
        if !current.status.can_transition_to(AlertStatus::Resolved) {
            return Ok(ResolveOutcome::AlreadyResolved(current));
        }

        let row: AlertRow = sqlx::query_as(queries::UPDATE_ALERT_RESOLVED)
            .bind(alert_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(ResolveOutcome::Resolved(SosAlert::try_from(row)?))
    }

    async fn release_ambulance(&self, ambulance_id: &str) -> Result<Ambulance, DispatchError> {
        let released: Option<AmbulanceRow> = sqlx::query_as(queries::UPDATE_AMBULANCE_AVAILABLE)
            .bind(ambulance_id)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = released {
            return Ok(Ambulance::from(row));
        }
        // Nothing to change: either already in service or unknown.
        self.ambulance_row(ambulance_id)
            .await?
            .ok_or_else(|| DispatchError::AmbulanceNotFound(ambulance_id.to_string()))
    }
}
