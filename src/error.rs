use thiserror::Error;
use uuid::Uuid;

use crate::models::ambulance::AmbulanceStatus;
use crate::models::sos_alert::AlertStatus;

/// Failures talking to either backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted record could not be mapped back into the domain model.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Why a dispatch or resolve command was rejected against current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    AlertNotActive { alert_id: Uuid, status: AlertStatus },
    AmbulanceUnavailable { ambulance_id: String, status: AmbulanceStatus },
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictReason::AlertNotActive { alert_id, status } => {
                write!(f, "alert {} is {}, not active", alert_id, status)
            }
            ConflictReason::AmbulanceUnavailable {
                ambulance_id,
                status,
            } => write!(f, "ambulance {} is {}, not available", ambulance_id, status),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The target changed under us. The caller should re-fetch and re-offer.
    #[error("dispatch conflict: {0}")]
    Conflict(ConflictReason),

    #[error("alert {0} not found")]
    AlertNotFound(Uuid),

    #[error("ambulance {0} not found")]
    AmbulanceNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Conflict(_))
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(e: sqlx::Error) -> Self {
        DispatchError::Store(StoreError::Database(e))
    }
}

/// Errors on the vehicle side: analysis, SOS triggering and publishing.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("accident analysis is unavailable: no detection service configured")]
    AnalysisUnavailable,

    #[error("detection service failed: {0}")]
    Detection(String),

    #[error("location unavailable: {0}")]
    Location(String),

    #[error("an SOS has already been sent for this session")]
    AlreadySent,

    #[error("publish failed: {0}")]
    Publish(String),

    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}
