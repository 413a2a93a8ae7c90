//! In-process backend for both stores. Used for local runs and tests.
//!
//! Alerts and ambulances sit behind one mutex, so a dispatch commit observes
//! and updates both records without interleaving with another commit.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    ChangeFeed, ChangeKind, ChangeRecord, DispatchLedger, DispatchReceipt, DocumentStore,
    RealtimeStore, ResolveOutcome, CHANGE_FEED_CAPACITY,
};
use crate::error::{ConflictReason, DispatchError, StoreError};
use crate::models::ambulance::{Ambulance, AmbulanceStatus};
use crate::dispatch::DispatchBoard;
use crate::models::corridor::{CorridorNotice, GreenCorridor};
use crate::models::hazard::{HazardMessage, NewHazardMessage};
use crate::models::location::GeoPoint;
use crate::models::sos_alert::{AlertStatus, NewSosAlert, SosAlert};
use crate::models::traffic_signal::{SignalState, TrafficSignal};

#[derive(Default)]
struct State {
    alerts: HashMap<Uuid, SosAlert>,
    messages: Vec<HazardMessage>,
    users: HashMap<String, GeoPoint>,
    ambulances: BTreeMap<String, Ambulance>,
    signals: BTreeMap<String, TrafficSignal>,
    corridor: Option<GreenCorridor>,
    notice: Option<CorridorNotice>,
    board: Option<DispatchBoard>,
    last_created_at: Option<DateTime<Utc>>,
}

impl State {
    /// Strictly increasing creation stamps, so arrival order is never a tie.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(stamp);
        stamp
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    alert_changes: broadcast::Sender<ChangeRecord>,
    ambulance_changes: broadcast::Sender<ChangeRecord>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (alert_changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let (ambulance_changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            state: Mutex::new(State::default()),
            alert_changes,
            ambulance_changes,
        }
    }

    pub fn user_location(&self, user_id: &str) -> Option<GeoPoint> {
        self.state.lock().users.get(user_id).copied()
    }

    fn notify_alert(&self, kind: ChangeKind, id: Uuid) {
        // No subscribers is fine.
        let _ = self.alert_changes.send(ChangeRecord::new(kind, id.to_string()));
    }

    fn notify_ambulance(&self, kind: ChangeKind, id: &str) {
        let _ = self.ambulance_changes.send(ChangeRecord::new(kind, id));
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_alert(&self, alert: NewSosAlert) -> Result<SosAlert, StoreError> {
        let created = {
            let mut state = self.state.lock();
            let id = alert.id.unwrap_or_else(Uuid::new_v4);
            if let Some(existing) = state.alerts.get(&id) {
                return Ok(existing.clone());
            }
            let created_at = state.next_created_at();
            let alert = alert.into_alert(id, created_at);
            state.alerts.insert(alert.id, alert.clone());
            alert
        };
        self.notify_alert(ChangeKind::Added, created.id);
        Ok(created)
    }

    async fn alert(&self, id: Uuid) -> Result<Option<SosAlert>, StoreError> {
        Ok(self.state.lock().alerts.get(&id).cloned())
    }

    async fn active_alerts(&self) -> Result<Vec<SosAlert>, StoreError> {
        let state = self.state.lock();
        let mut active: Vec<SosAlert> = state
            .alerts
            .values()
            .filter(|a| a.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(active)
    }

    async fn append_message(&self, message: NewHazardMessage) -> Result<HazardMessage, StoreError> {
        let mut state = self.state.lock();
        let created_at = state.next_created_at();
        let message = message.into_message(Uuid::new_v4(), created_at);
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn recent_messages(&self, limit: usize) -> Result<Vec<HazardMessage>, StoreError> {
        let state = self.state.lock();
        Ok(state.messages.iter().rev().take(limit).cloned().collect())
    }

    async fn update_user_location(&self, user_id: &str, location: GeoPoint) -> Result<(), StoreError> {
        self.state.lock().users.insert(user_id.to_string(), location);
        Ok(())
    }

    fn subscribe_alerts(&self) -> ChangeFeed {
        self.alert_changes.subscribe()
    }
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    async fn ambulances(&self) -> Result<Vec<Ambulance>, StoreError> {
        Ok(self.state.lock().ambulances.values().cloned().collect())
    }

    async fn ambulance(&self, id: &str) -> Result<Option<Ambulance>, StoreError> {
        Ok(self.state.lock().ambulances.get(id).cloned())
    }

    async fn register_ambulance(&self, mut ambulance: Ambulance) -> Result<(), StoreError> {
        let id = ambulance.id.clone();
        let existed = {
            let mut state = self.state.lock();
            // A unit on a dispatch keeps it until released.
            if let Some(current) = state.ambulances.get(&id) {
                if current.status == AmbulanceStatus::EnRoute {
                    ambulance.status = current.status;
                    ambulance.destination = current.destination;
                }
            }
            state.ambulances.insert(id.clone(), ambulance).is_some()
        };
        let kind = if existed {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };
        self.notify_ambulance(kind, &id);
        Ok(())
    }

    async fn update_ambulance_position(
        &self,
        id: &str,
        location: GeoPoint,
        speed_kmh: Option<f64>,
    ) -> Result<bool, StoreError> {
        {
            let mut state = self.state.lock();
            let Some(ambulance) = state.ambulances.get_mut(id) else {
                return Ok(false);
            };
            ambulance.location = location;
            if speed_kmh.is_some() {
                ambulance.speed_kmh = speed_kmh;
            }
        }
        self.notify_ambulance(ChangeKind::Modified, id);
        Ok(true)
    }

    async fn traffic_signals(&self) -> Result<Vec<TrafficSignal>, StoreError> {
        Ok(self.state.lock().signals.values().cloned().collect())
    }

    async fn put_traffic_signal(&self, signal: TrafficSignal) -> Result<(), StoreError> {
        self.state.lock().signals.insert(signal.id.clone(), signal);
        Ok(())
    }

    async fn set_signal_state(&self, id: &str, state: SignalState) -> Result<bool, StoreError> {
        let mut guard = self.state.lock();
        match guard.signals.get_mut(id) {
            Some(signal) => {
                signal.state = state;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn corridor(&self) -> Result<Option<GreenCorridor>, StoreError> {
        Ok(self.state.lock().corridor.clone())
    }

    async fn put_corridor(&self, corridor: &GreenCorridor) -> Result<(), StoreError> {
        self.state.lock().corridor = Some(corridor.clone());
        Ok(())
    }

    async fn corridor_notice(&self) -> Result<Option<CorridorNotice>, StoreError> {
        Ok(self.state.lock().notice.clone())
    }

    async fn put_corridor_notice(&self, notice: &CorridorNotice) -> Result<(), StoreError> {
        self.state.lock().notice = Some(notice.clone());
        Ok(())
    }

    async fn dispatch_board(&self) -> Result<Option<DispatchBoard>, StoreError> {
        Ok(self.state.lock().board.clone())
    }

    async fn put_dispatch_board(&self, board: &DispatchBoard) -> Result<(), StoreError> {
        self.state.lock().board = Some(board.clone());
        Ok(())
    }

    fn subscribe_ambulances(&self) -> ChangeFeed {
        self.ambulance_changes.subscribe()
    }
}

#[async_trait]
impl DispatchLedger for MemoryStore {
    async fn commit_dispatch(&self, alert_id: Uuid, ambulance_id: &str) -> Result<DispatchReceipt, DispatchError> {
        let receipt = {
            let mut state = self.state.lock();

            let alert = state
                .alerts
                .get(&alert_id)
                .ok_or(DispatchError::AlertNotFound(alert_id))?;
            if !alert.status.can_transition_to(AlertStatus::Dispatched) {
                return Err(DispatchError::Conflict(ConflictReason::AlertNotActive {
                    alert_id,
                    status: alert.status,
                }));
            }
            let destination = alert.location;

            let ambulance = state
                .ambulances
                .get(ambulance_id)
                .ok_or_else(|| DispatchError::AmbulanceNotFound(ambulance_id.to_string()))?;
            if ambulance.status != AmbulanceStatus::Available {
                return Err(DispatchError::Conflict(ConflictReason::AmbulanceUnavailable {
                    ambulance_id: ambulance_id.to_string(),
                    status: ambulance.status,
                }));
            }

            // Both targets validated under the same lock; apply both or neither.
            let ambulance = state
                .ambulances
                .get_mut(ambulance_id)
                .ok_or_else(|| DispatchError::AmbulanceNotFound(ambulance_id.to_string()))?;
            ambulance.status = AmbulanceStatus::EnRoute;
            ambulance.destination = Some(destination);
            let ambulance = ambulance.clone();

            let alert = state
                .alerts
                .get_mut(&alert_id)
                .ok_or(DispatchError::AlertNotFound(alert_id))?;
            alert.status = AlertStatus::Dispatched;
            alert.dispatched_ambulance_id = Some(ambulance_id.to_string());

            DispatchReceipt {
                alert: alert.clone(),
                ambulance,
            }
        };

        self.notify_alert(ChangeKind::Modified, alert_id);
        self.notify_ambulance(ChangeKind::Modified, ambulance_id);
        Ok(receipt)
    }

    async fn resolve_alert(&self, alert_id: Uuid) -> Result<ResolveOutcome, DispatchError> {
        let outcome = {
            let mut state = self.state.lock();
            let alert = state
                .alerts
                .get_mut(&alert_id)
                .ok_or(DispatchError::AlertNotFound(alert_id))?;
            if !alert.status.can_transition_to(AlertStatus::Resolved) {
                return Ok(ResolveOutcome::AlreadyResolved(alert.clone()));
            }
            alert.status = AlertStatus::Resolved;
            ResolveOutcome::Resolved(alert.clone())
        };
        self.notify_alert(ChangeKind::Modified, alert_id);
        Ok(outcome)
    }

    async fn release_ambulance(&self, ambulance_id: &str) -> Result<Ambulance, DispatchError> {
        let (ambulance, changed) = {
            let mut state = self.state.lock();
            let ambulance = state
                .ambulances
                .get_mut(ambulance_id)
                .ok_or_else(|| DispatchError::AmbulanceNotFound(ambulance_id.to_string()))?;
            let changed = ambulance.status != AmbulanceStatus::Available || ambulance.destination.is_some();
            ambulance.status = AmbulanceStatus::Available;
            ambulance.destination = None;
            (ambulance.clone(), changed)
        };
        if changed {
            self.notify_ambulance(ChangeKind::Modified, ambulance_id);
        }
        Ok(ambulance)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::hazard::MessageKind;
    use crate::models::sos_alert::{SenderInfo, VehicleData};

    fn sos(username: &str, lat: f64, lng: f64) -> NewSosAlert {
        NewSosAlert {
            id: None,
            sender_info: SenderInfo {
                user_id: format!("user-{}", username),
                username: username.to_string(),
                reg_number: None,
            },
            location: GeoPoint::new(lat, lng),
            vehicle_data: VehicleData::default(),
            trigger_method: "Manual".to_string(),
        }
    }

    #[tokio::test]
    async fn dispatch_updates_both_records() {
        let store = MemoryStore::new();
        store
            .register_ambulance(Ambulance::new("AMB-1", GeoPoint::new(12.97, 77.59)))
            .await
            .unwrap();
        let alert = store.create_alert(sos("a", 12.93, 77.62)).await.unwrap();

        let receipt = store.commit_dispatch(alert.id, "AMB-1").await.unwrap();
        assert_eq!(receipt.alert.status, AlertStatus::Dispatched);
        assert_eq!(receipt.alert.dispatched_ambulance_id.as_deref(), Some("AMB-1"));
        assert_eq!(receipt.ambulance.status, AmbulanceStatus::EnRoute);
        assert_eq!(receipt.ambulance.destination, Some(alert.location));

        assert!(store.active_alerts().await.unwrap().is_empty());
        let stored = store.ambulance("AMB-1").await.unwrap().unwrap();
        assert_eq!(stored.status, AmbulanceStatus::EnRoute);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatch_of_one_ambulance_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        store
            .register_ambulance(Ambulance::new("AMB-1", GeoPoint::new(12.97, 77.59)))
            .await
            .unwrap();
        let first = store.create_alert(sos("a", 12.93, 77.62)).await.unwrap();
        let second = store.create_alert(sos("b", 12.95, 77.60)).await.unwrap();

        let s1 = store.clone();
        let s2 = store.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { s1.commit_dispatch(first.id, "AMB-1").await }),
            tokio::spawn(async move { s2.commit_dispatch(second.id, "AMB-1").await }),
        );
        let results = [r1.unwrap(), r2.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(loser.is_retryable());

        // The losing alert is untouched.
        let active = store.active_alerts().await.unwrap();
        assert_eq!(active.len(), 1);
        assert!(active[0].dispatched_ambulance_id.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispatch_of_one_alert_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        for id in ["AMB-1", "AMB-2"] {
            store
                .register_ambulance(Ambulance::new(id, GeoPoint::new(12.97, 77.59)))
                .await
                .unwrap();
        }
        let alert_id = store.create_alert(sos("a", 12.93, 77.62)).await.unwrap().id;

        let s1 = store.clone();
        let s2 = store.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { s1.commit_dispatch(alert_id, "AMB-1").await }),
            tokio::spawn(async move { s2.commit_dispatch(alert_id, "AMB-2").await }),
        );
        let results = [r1.unwrap(), r2.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert!(matches!(
            loser,
            DispatchError::Conflict(ConflictReason::AlertNotActive { .. })
        ));

        // Exactly one unit left service, and it is the one on the alert.
        let units = store.ambulances().await.unwrap();
        let busy: Vec<&str> = units.iter().filter(|a| !a.is_available()).map(|a| a.id.as_str()).collect();
        assert_eq!(busy, vec![winner.ambulance.id.as_str()]);
        let stored = store.alert(alert_id).await.unwrap().unwrap();
        assert_eq!(stored.dispatched_ambulance_id.as_deref(), Some(winner.ambulance.id.as_str()));
    }

    #[tokio::test]
    async fn reregistering_keeps_a_dispatched_unit_busy() {
        let store = MemoryStore::new();
        store
            .register_ambulance(Ambulance::new("AMB-1", GeoPoint::new(12.97, 77.59)))
            .await
            .unwrap();
        let alert = store.create_alert(sos("a", 12.93, 77.62)).await.unwrap();
        store.commit_dispatch(alert.id, "AMB-1").await.unwrap();

        let mut again = Ambulance::new("AMB-1", GeoPoint::new(12.96, 77.60));
        again.unit_type = Some("Advanced Life Support".to_string());
        store.register_ambulance(again).await.unwrap();

        let stored = store.ambulance("AMB-1").await.unwrap().unwrap();
        assert_eq!(stored.status, AmbulanceStatus::EnRoute);
        assert_eq!(stored.destination, Some(alert.location));
        assert_eq!(stored.location, GeoPoint::new(12.96, 77.60));
        assert_eq!(stored.unit_type.as_deref(), Some("Advanced Life Support"));

        let second = store.create_alert(sos("b", 12.95, 77.60)).await.unwrap();
        assert!(store.commit_dispatch(second.id, "AMB-1").await.unwrap_err().is_retryable());

        // Once released, registration sets the status again.
        store.release_ambulance("AMB-1").await.unwrap();
        let mut off_duty = Ambulance::new("AMB-1", GeoPoint::new(12.96, 77.60));
        off_duty.status = AmbulanceStatus::Unavailable;
        store.register_ambulance(off_duty).await.unwrap();
        assert_eq!(
            store.ambulance("AMB-1").await.unwrap().unwrap().status,
            AmbulanceStatus::Unavailable
        );
    }

    #[tokio::test]
    async fn second_dispatch_of_same_alert_conflicts() {
        let store = MemoryStore::new();
        for id in ["AMB-1", "AMB-2"] {
            store
                .register_ambulance(Ambulance::new(id, GeoPoint::new(12.97, 77.59)))
                .await
                .unwrap();
        }
        let alert = store.create_alert(sos("a", 12.93, 77.62)).await.unwrap();

        store.commit_dispatch(alert.id, "AMB-1").await.unwrap();
        let err = store.commit_dispatch(alert.id, "AMB-2").await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Conflict(ConflictReason::AlertNotActive {
                status: AlertStatus::Dispatched,
                ..
            })
        ));
        // AMB-2 never left service.
        assert!(store.ambulance("AMB-2").await.unwrap().unwrap().is_available());
    }

    #[tokio::test]
    async fn resolve_is_idempotent_and_keeps_assignment() {
        let store = MemoryStore::new();
        store
            .register_ambulance(Ambulance::new("AMB-1", GeoPoint::new(12.97, 77.59)))
            .await
            .unwrap();
        let alert = store.create_alert(sos("a", 12.93, 77.62)).await.unwrap();
        store.commit_dispatch(alert.id, "AMB-1").await.unwrap();

        let first = store.resolve_alert(alert.id).await.unwrap();
        assert!(matches!(first, ResolveOutcome::Resolved(_)));
        let second = store.resolve_alert(alert.id).await.unwrap();
        assert!(matches!(second, ResolveOutcome::AlreadyResolved(_)));
        assert_eq!(second.alert().dispatched_ambulance_id.as_deref(), Some("AMB-1"));

        // Resolving does not free the ambulance.
        let amb = store.ambulance("AMB-1").await.unwrap().unwrap();
        assert_eq!(amb.status, AmbulanceStatus::EnRoute);

        // And a resolved alert can never be dispatched again.
        let err = store.commit_dispatch(alert.id, "AMB-1").await.unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
    }

    #[tokio::test]
    async fn release_returns_unit_to_service() {
        let store = MemoryStore::new();
        store
            .register_ambulance(Ambulance::new("AMB-1", GeoPoint::new(12.97, 77.59)))
            .await
            .unwrap();
        let alert = store.create_alert(sos("a", 12.93, 77.62)).await.unwrap();
        store.commit_dispatch(alert.id, "AMB-1").await.unwrap();

        let amb = store.release_ambulance("AMB-1").await.unwrap();
        assert!(amb.is_available());
        assert!(amb.destination.is_none());
        assert!(store.release_ambulance("AMB-1").await.unwrap().is_available());
        assert!(matches!(
            store.release_ambulance("AMB-404").await,
            Err(DispatchError::AmbulanceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_targets_are_not_found() {
        let store = MemoryStore::new();
        let alert = store.create_alert(sos("a", 12.93, 77.62)).await.unwrap();
        assert!(matches!(
            store.commit_dispatch(alert.id, "AMB-404").await,
            Err(DispatchError::AmbulanceNotFound(_))
        ));
        assert!(matches!(
            store.commit_dispatch(Uuid::new_v4(), "AMB-404").await,
            Err(DispatchError::AlertNotFound(_))
        ));
        // A failed commit leaves the alert active.
        assert_eq!(store.active_alerts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recent_messages_are_newest_first_and_bounded() {
        let store = MemoryStore::new();
        for i in 0..12 {
            store
                .append_message(NewHazardMessage {
                    kind: MessageKind::Custom,
                    message: format!("msg {}", i),
                    ai_analysis: None,
                    sender_info: sos("a", 0.0, 0.0).sender_info,
                    location: GeoPoint::new(12.9, 77.6),
                })
                .await
                .unwrap();
        }
        let feed = store.recent_messages(10).await.unwrap();
        assert_eq!(feed.len(), 10);
        assert_eq!(feed[0].message, "msg 11");
        assert_eq!(feed[9].message, "msg 2");
    }

    #[tokio::test]
    async fn changes_are_broadcast() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe_alerts();
        let alert = store.create_alert(sos("a", 12.93, 77.62)).await.unwrap();
        let record = feed.recv().await.unwrap();
        assert_eq!(record.kind, ChangeKind::Added);
        assert!(record.concerns(&alert.id.to_string()));
    }

    #[tokio::test]
    async fn redelivered_sos_is_not_duplicated() {
        let store = MemoryStore::new();
        let mut new = sos("a", 12.93, 77.62);
        new.id = Some(Uuid::new_v4());

        let first = store.create_alert(new.clone()).await.unwrap();
        let second = store.create_alert(new).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.active_alerts().await.unwrap().len(), 1);
    }
}
