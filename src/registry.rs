//! Authoritative in-memory view of the currently active SOS alerts.
//!
//! Every upstream change triggers a reload of the complete active set, which
//! replaces the snapshot wholesale. A missed or coalesced notification can
//! therefore never leave the view inconsistent.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::sos_alert::SosAlert;
use crate::store::{DocumentStore, SubscriptionHandle};

#[derive(Debug, Default)]
struct Snapshot {
    ordered: Vec<SosAlert>,
    index: HashMap<Uuid, usize>,
}

#[derive(Clone)]
pub struct AlertRegistry {
    snapshot: Arc<RwLock<Snapshot>>,
    version: Arc<watch::Sender<u64>>,
}

impl Default for AlertRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertRegistry {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            snapshot: Arc::new(RwLock::new(Snapshot::default())),
            version: Arc::new(version),
        }
    }

    /// Installs a full replacement set. Non-active alerts are dropped and the
    /// rest are kept in arrival order.
    pub fn replace(&self, alerts: Vec<SosAlert>) {
        let mut ordered: Vec<SosAlert> = alerts.into_iter().filter(|a| a.is_active()).collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        ordered.dedup_by_key(|a| a.id);
        let index = ordered.iter().enumerate().map(|(i, a)| (a.id, i)).collect();

        let count = ordered.len();
        *self.snapshot.write() = Snapshot { ordered, index };
        self.version.send_modify(|v| *v += 1);
        debug!(active = count, "Alert registry replaced");
    }

    pub fn active_alerts(&self) -> Vec<SosAlert> {
        self.snapshot.read().ordered.clone()
    }

    pub fn get(&self, id: &Uuid) -> Option<SosAlert> {
        let snapshot = self.snapshot.read();
        snapshot.index.get(id).map(|&i| snapshot.ordered[i].clone())
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ticks once per installed snapshot.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub async fn reload(&self, store: &dyn DocumentStore) -> bool {
        match store.active_alerts().await {
            Ok(alerts) => {
                self.replace(alerts);
                true
            }
            Err(e) => {
                warn!("Failed to reload active alerts: {}", e);
                false
            }
        }
    }

    /// Keeps the registry in step with the document store until the returned
    /// handle is dropped or the feed closes.
    pub fn sync(&self, store: Arc<dyn DocumentStore>) -> SubscriptionHandle {
        let registry = self.clone();
        // Subscribe before the first load so nothing slips between the two.
        let mut feed = store.subscribe_alerts();

        let task = tokio::spawn(async move {
            registry.reload(store.as_ref()).await;
            loop {
                match feed.recv().await {
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Alert feed lagged by {} records, reloading", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Alert change feed closed");
                        break;
                    }
                }
                // Coalesce a burst into a single reload.
                while let Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) = feed.try_recv() {}
                registry.reload(store.as_ref()).await;
            }
        });

        SubscriptionHandle::new("alert-registry", task)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::location::GeoPoint;
    use crate::models::sos_alert::AlertStatus;
    use crate::store::memory::MemoryStore;
    use crate::store::DispatchLedger;
    use crate::testing;

    #[test]
    fn replace_keeps_only_active_in_arrival_order() {
        let registry = AlertRegistry::new();
        let first = testing::alert(1, GeoPoint::new(12.9, 77.6), None);
        let second = testing::alert(2, GeoPoint::new(12.9, 77.6), None);
        let mut resolved = testing::alert(3, GeoPoint::new(12.9, 77.6), None);
        resolved.status = AlertStatus::Resolved;

        registry.replace(vec![second.clone(), resolved.clone(), first.clone()]);

        let ids: Vec<Uuid> = registry.active_alerts().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert!(registry.get(&resolved.id).is_none());
        assert_eq!(registry.get(&second.id).unwrap().id, second.id);
    }

    #[test]
    fn replace_is_wholesale() {
        let registry = AlertRegistry::new();
        let a = testing::alert(1, GeoPoint::new(12.9, 77.6), None);
        let b = testing::alert(2, GeoPoint::new(12.9, 77.6), None);
        registry.replace(vec![a.clone()]);
        registry.replace(vec![b.clone()]);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&a.id).is_none());
    }

    #[tokio::test]
    async fn sync_follows_the_store() {
        let store = Arc::new(MemoryStore::new());
        let registry = AlertRegistry::new();
        let mut changes = registry.changes();
        let _handle = registry.sync(store.clone());

        let created = crate::store::DocumentStore::create_alert(
            store.as_ref(),
            testing::new_sos("asha", GeoPoint::new(12.93, 77.62), None),
        )
        .await
        .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.get(&created.id).is_none() {
                changes.changed().await.unwrap();
            }
        })
        .await
        .expect("registry never saw the new alert");

        store.resolve_alert(created.id).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !registry.is_empty() {
                changes.changed().await.unwrap();
            }
        })
        .await
        .expect("registry kept a resolved alert");
    }

    #[tokio::test]
    async fn unsubscribe_stops_updates() {
        let store = Arc::new(MemoryStore::new());
        let registry = AlertRegistry::new();
        let handle = registry.sync(store.clone());
        handle.unsubscribe();

        tokio::time::sleep(Duration::from_millis(20)).await;
        crate::store::DocumentStore::create_alert(
            store.as_ref(),
            testing::new_sos("ravi", GeoPoint::new(12.93, 77.62), None),
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_empty());
    }
}
