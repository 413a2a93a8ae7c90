//! Green-corridor propagation into the real-time store.
//!
//! Only the active flag and the owning alert are remembered here. Signal
//! selection and route rendering happen on the client from the two endpoints.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::ambulance::Ambulance;
use crate::models::corridor::{CorridorNotice, GreenCorridor, NoticeKind};
use crate::models::location::GeoPoint;
use crate::models::sos_alert::SosAlert;
use crate::severity::{classify_alert, SeverityTier};
use crate::store::RealtimeStore;

pub struct CorridorPropagator {
    store: Arc<dyn RealtimeStore>,
    owner: Mutex<Option<Uuid>>,
}

impl CorridorPropagator {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self {
            store,
            owner: Mutex::new(None),
        }
    }

    pub async fn is_active(&self) -> bool {
        self.owner.lock().await.is_some()
    }

    pub async fn owner(&self) -> Option<Uuid> {
        *self.owner.lock().await
    }

    /// Opens a corridor between the unit and the incident on behalf of `alert_id`.
    /// A newer activation takes ownership from an older one.
    pub async fn activate(
        &self,
        alert_id: Uuid,
        ambulance: &Ambulance,
        sos_location: GeoPoint,
    ) -> Result<(), StoreError> {
        let mut owner = self.owner.lock().await;
        self.store
            .put_corridor(&GreenCorridor::active(ambulance.location, sos_location))
            .await?;
        self.store
            .put_corridor_notice(&CorridorNotice {
                kind: NoticeKind::Active,
                title: "Green Corridor Activated".to_string(),
                message: format!(
                    "Ambulance {} en route to a critical incident. Traffic signals on the route are turning green.",
                    ambulance.id
                ),
                timestamp: Utc::now(),
            })
            .await?;
        *owner = Some(alert_id);
        info!(alert_id = %alert_id, ambulance_id = %ambulance.id, "Green corridor activated");
        Ok(())
    }

    /// Called after a successful dispatch. Returns whether a corridor was opened.
    pub async fn on_dispatched(&self, alert: &SosAlert, ambulance: &Ambulance) -> Result<bool, StoreError> {
        let tier = classify_alert(alert);
        if tier != SeverityTier::High {
            debug!(alert_id = %alert.id, %tier, "No corridor for non-critical dispatch");
            return Ok(false);
        }
        self.activate(alert.id, ambulance, alert.location).await?;
        Ok(true)
    }

    /// Called after an alert is resolved. Closes the corridor only if that
    /// alert owns it; the check and the close happen under one lock.
    pub async fn on_resolved(&self, alert_id: Uuid) -> Result<bool, StoreError> {
        let mut owner = self.owner.lock().await;
        if *owner != Some(alert_id) {
            return Ok(false);
        }
        self.close(&mut owner).await
    }

    /// Returns `false` without touching the store when no corridor is active.
    pub async fn deactivate(&self) -> Result<bool, StoreError> {
        let mut owner = self.owner.lock().await;
        self.close(&mut owner).await
    }

    async fn close(&self, owner: &mut Option<Uuid>) -> Result<bool, StoreError> {
        let Some(alert_id) = *owner else {
            return Ok(false);
        };
        self.store.put_corridor(&GreenCorridor::inactive()).await?;
        self.store
            .put_corridor_notice(&CorridorNotice {
                kind: NoticeKind::Deactivated,
                title: "Green Corridor Deactivated".to_string(),
                message: "Emergency resolved. Traffic signals are back to normal operation.".to_string(),
                timestamp: Utc::now(),
            })
            .await?;
        *owner = None;
        info!(alert_id = %alert_id, "Green corridor deactivated");
        Ok(true)
    }
}
