use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::corridor::CorridorPropagator;
use crate::error::DispatchError;
use crate::models::ambulance::Ambulance;
use crate::store::{DispatchLedger, DispatchReceipt, ResolveOutcome};

/// Operator-facing commands. Status writes go through the ledger; the corridor
/// follows as a side effect that never undoes a committed dispatch.
pub struct Dispatcher {
    ledger: Arc<dyn DispatchLedger>,
    corridor: Arc<CorridorPropagator>,
    default_speed_kmh: f64,
}

impl Dispatcher {
    pub fn new(ledger: Arc<dyn DispatchLedger>, corridor: Arc<CorridorPropagator>, default_speed_kmh: f64) -> Self {
        Self {
            ledger,
            corridor,
            default_speed_kmh,
        }
    }

    pub fn corridor(&self) -> &Arc<CorridorPropagator> {
        &self.corridor
    }

    pub async fn dispatch(&self, alert_id: Uuid, ambulance_id: &str) -> Result<DispatchReceipt, DispatchError> {
        let receipt = match self.ledger.commit_dispatch(alert_id, ambulance_id).await {
            Ok(r) => r,
            Err(DispatchError::Conflict(reason)) => {
                warn!(alert_id = %alert_id, ambulance_id, "Dispatch rejected: {}", reason);
                return Err(DispatchError::Conflict(reason));
            }
            Err(e) => return Err(e),
        };

        let eta = receipt
            .ambulance
            .eta_minutes_to(&receipt.alert.location, self.default_speed_kmh);
        info!(
            alert_id = %alert_id,
            ambulance_id,
            eta_minutes = ?eta,
            "Ambulance dispatched"
        );

        if let Err(e) = self.corridor.on_dispatched(&receipt.alert, &receipt.ambulance).await {
            warn!(alert_id = %alert_id, "Dispatch committed but corridor update failed: {}", e);
        }
        Ok(receipt)
    }

    pub async fn resolve(&self, alert_id: Uuid) -> Result<ResolveOutcome, DispatchError> {
        let outcome = self.ledger.resolve_alert(alert_id).await?;
        match &outcome {
            ResolveOutcome::Resolved(_) => info!(alert_id = %alert_id, "Alert resolved"),
            ResolveOutcome::AlreadyResolved(_) => info!(alert_id = %alert_id, "Alert was already resolved"),
        }

        if let Err(e) = self.corridor.on_resolved(alert_id).await {
            warn!(alert_id = %alert_id, "Alert resolved but corridor teardown failed: {}", e);
        }
        Ok(outcome)
    }

    pub async fn release_ambulance(&self, ambulance_id: &str) -> Result<Ambulance, DispatchError> {
        let ambulance = self.ledger.release_ambulance(ambulance_id).await?;
        info!(ambulance_id, "Ambulance back in service");
        Ok(ambulance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConflictReason;
    use crate::models::ambulance::{AmbulanceStatus, DEFAULT_SPEED_KMH};
    use crate::models::location::GeoPoint;
    use crate::models::sos_alert::AlertStatus;
    use crate::store::memory::MemoryStore;
    use crate::store::{DocumentStore, RealtimeStore};
    use crate::testing;

    const SITE: GeoPoint = GeoPoint::new(12.9352, 77.6245);

    async fn setup() -> (Arc<MemoryStore>, Dispatcher) {
        let store = Arc::new(MemoryStore::new());
        for (id, lat) in [("AMB-1", 12.95), ("AMB-2", 12.99)] {
            store
                .register_ambulance(testing::ambulance(id, GeoPoint::new(lat, 77.60)))
                .await
                .unwrap();
        }
        let corridor = Arc::new(CorridorPropagator::new(store.clone()));
        let dispatcher = Dispatcher::new(store.clone(), corridor, DEFAULT_SPEED_KMH);
        (store, dispatcher)
    }

    #[tokio::test]
    async fn critical_dispatch_commits_and_opens_corridor() {
        let (store, dispatcher) = setup().await;
        let alert = store
            .create_alert(testing::new_sos("meera", SITE, testing::high()))
            .await
            .unwrap();

        let receipt = dispatcher.dispatch(alert.id, "AMB-1").await.unwrap();
        assert_eq!(receipt.alert.status, AlertStatus::Dispatched);
        assert_eq!(receipt.ambulance.status, AmbulanceStatus::EnRoute);
        assert_eq!(receipt.ambulance.destination, Some(SITE));
        assert!(dispatcher.corridor().is_active().await);
        assert!(store.corridor().await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn losing_a_race_reports_the_conflict() {
        let (store, dispatcher) = setup().await;
        let first = store.create_alert(testing::new_sos("a", SITE, None)).await.unwrap();
        let second = store.create_alert(testing::new_sos("b", SITE, None)).await.unwrap();

        dispatcher.dispatch(first.id, "AMB-1").await.unwrap();
        let err = dispatcher.dispatch(second.id, "AMB-1").await.unwrap_err();
        assert!(err.is_retryable());
        match err {
            DispatchError::Conflict(ConflictReason::AmbulanceUnavailable { status, .. }) => {
                assert_eq!(status, AmbulanceStatus::EnRoute);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // The loser's alert is untouched and can be re-offered.
        assert_eq!(store.alert(second.id).await.unwrap().unwrap().status, AlertStatus::Active);
        assert!(!dispatcher.corridor().is_active().await);
    }

    #[tokio::test]
    async fn resolve_closes_corridor_but_keeps_unit_busy() {
        let (store, dispatcher) = setup().await;
        let alert = store
            .create_alert(testing::new_sos("meera", SITE, testing::high()))
            .await
            .unwrap();
        dispatcher.dispatch(alert.id, "AMB-1").await.unwrap();

        let outcome = dispatcher.resolve(alert.id).await.unwrap();
        assert!(matches!(outcome, ResolveOutcome::Resolved(_)));
        assert_eq!(outcome.alert().dispatched_ambulance_id.as_deref(), Some("AMB-1"));
        assert!(!dispatcher.corridor().is_active().await);

        let unit = store.ambulance("AMB-1").await.unwrap().unwrap();
        assert_eq!(unit.status, AmbulanceStatus::EnRoute);

        let again = dispatcher.resolve(alert.id).await.unwrap();
        assert!(matches!(again, ResolveOutcome::AlreadyResolved(_)));

        let released = dispatcher.release_ambulance("AMB-1").await.unwrap();
        assert!(released.is_available());
        assert!(released.destination.is_none());
    }

    #[tokio::test]
    async fn resolving_an_active_alert_is_allowed() {
        let (store, dispatcher) = setup().await;
        let alert = store.create_alert(testing::new_sos("x", SITE, None)).await.unwrap();
        let outcome = dispatcher.resolve(alert.id).await.unwrap();
        assert_eq!(outcome.alert().status, AlertStatus::Resolved);
        assert!(outcome.alert().dispatched_ambulance_id.is_none());
    }
}
