//! In-memory view of the ambulance fleet, rebuilt from the whole ambulance
//! keyspace on every change.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::models::ambulance::Ambulance;
use crate::store::{RealtimeStore, SubscriptionHandle};

#[derive(Clone)]
pub struct FleetTracker {
    units: Arc<RwLock<BTreeMap<String, Ambulance>>>,
    version: Arc<watch::Sender<u64>>,
}

impl Default for FleetTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetTracker {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            units: Arc::new(RwLock::new(BTreeMap::new())),
            version: Arc::new(version),
        }
    }

    pub fn replace(&self, ambulances: Vec<Ambulance>) {
        let mut units = BTreeMap::new();
        for ambulance in ambulances {
            if !ambulance.location.is_valid() {
                warn!("Ignoring ambulance {} with invalid location", ambulance.id);
                continue;
            }
            units.insert(ambulance.id.clone(), ambulance);
        }
        let count = units.len();
        *self.units.write() = units;
        self.version.send_modify(|v| *v += 1);
        debug!(units = count, "Fleet snapshot replaced");
    }

    pub fn all(&self) -> Vec<Ambulance> {
        self.units.read().values().cloned().collect()
    }

    /// Units currently free to take an assignment, ordered by id.
    pub fn available(&self) -> Vec<Ambulance> {
        self.units
            .read()
            .values()
            .filter(|a| a.is_available())
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Ambulance> {
        self.units.read().get(id).cloned()
    }

    pub fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub async fn reload(&self, store: &dyn RealtimeStore) -> bool {
        match store.ambulances().await {
            Ok(ambulances) => {
                self.replace(ambulances);
                true
            }
            Err(e) => {
                warn!("Failed to reload ambulance fleet: {}", e);
                false
            }
        }
    }

    pub fn sync(&self, store: Arc<dyn RealtimeStore>) -> SubscriptionHandle {
        let fleet = self.clone();
        let mut feed = store.subscribe_ambulances();

        let task = tokio::spawn(async move {
            fleet.reload(store.as_ref()).await;
            loop {
                match feed.recv().await {
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Ambulance feed lagged by {} records, reloading", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Ambulance change feed closed");
                        break;
                    }
                }
                while let Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) = feed.try_recv() {}
                fleet.reload(store.as_ref()).await;
            }
        });

        SubscriptionHandle::new("fleet-tracker", task)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::ambulance::AmbulanceStatus;
    use crate::models::location::GeoPoint;
    use crate::store::memory::MemoryStore;
    use crate::testing;

    #[test]
    fn available_excludes_busy_and_unknown_units() {
        let fleet = FleetTracker::new();
        let mut busy = testing::ambulance("AMB-2", GeoPoint::new(12.9, 77.6));
        busy.status = AmbulanceStatus::EnRoute;
        let mut off = testing::ambulance("AMB-3", GeoPoint::new(12.9, 77.6));
        off.status = AmbulanceStatus::Unavailable;
        fleet.replace(vec![
            busy,
            off,
            testing::ambulance("AMB-1", GeoPoint::new(12.9, 77.6)),
        ]);

        assert_eq!(fleet.all().len(), 3);
        let free: Vec<String> = fleet.available().into_iter().map(|a| a.id).collect();
        assert_eq!(free, vec!["AMB-1".to_string()]);
    }

    #[test]
    fn invalid_positions_are_dropped() {
        let fleet = FleetTracker::new();
        fleet.replace(vec![testing::ambulance("AMB-9", GeoPoint::new(f64::NAN, 77.6))]);
        assert!(fleet.all().is_empty());
    }

    #[tokio::test]
    async fn sync_sees_position_updates() {
        let store = Arc::new(MemoryStore::new());
        store
            .register_ambulance(testing::ambulance("AMB-1", GeoPoint::new(12.9, 77.6)))
            .await
            .unwrap();
        let fleet = FleetTracker::new();
        let mut changes = fleet.changes();
        let _handle = fleet.sync(store.clone());

        store
            .update_ambulance_position("AMB-1", GeoPoint::new(13.0, 77.7), Some(38.0))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(amb) = fleet.get("AMB-1") {
                    if amb.location == GeoPoint::new(13.0, 77.7) {
                        break;
                    }
                }
                changes.changed().await.unwrap();
            }
        })
        .await
        .expect("fleet never saw the position update");
        assert_eq!(fleet.get("AMB-1").unwrap().speed_kmh, Some(38.0));
    }
}
