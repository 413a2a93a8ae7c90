//! Contracts for the two external stores and the cross-store dispatch commit.
//!
//! The document store holds alerts, the hazard feed and vehicle users. The
//! real-time store holds the ambulance keyspace, traffic signals and the green
//! corridor. Dispatch touches both, so its commit lives behind
//! `DispatchLedger`, which every backend must implement atomically.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::dispatch::DispatchBoard;
use crate::error::{DispatchError, StoreError};
use crate::models::ambulance::Ambulance;
use crate::models::corridor::{CorridorNotice, GreenCorridor};
use crate::models::hazard::{HazardMessage, NewHazardMessage};
use crate::models::location::GeoPoint;
use crate::models::sos_alert::{NewSosAlert, SosAlert};
use crate::models::traffic_signal::{SignalState, TrafficSignal};

pub mod memory;

/// Capacity of each change feed. A slow subscriber that falls further behind
/// than this sees `Lagged` and must reload in full.
pub const CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
    /// Notifications may have been lost, so subscribers must reload everything.
    Resync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    /// Key of the changed record. `None` for `Resync`.
    pub key: Option<String>,
}

impl ChangeRecord {
    pub fn new(kind: ChangeKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: Some(key.into()),
        }
    }

    pub fn resync() -> Self {
        Self {
            kind: ChangeKind::Resync,
            key: None,
        }
    }

    pub fn concerns(&self, key: &str) -> bool {
        self.kind == ChangeKind::Resync || self.key.as_deref() == Some(key)
    }
}

pub type ChangeFeed = broadcast::Receiver<ChangeRecord>;

/// Owns a background subscription task. Dropping the handle cancels it.
#[derive(Debug)]
pub struct SubscriptionHandle {
    name: String,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn new(name: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            task: Some(task),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    /// Waits for the task to end on its own, for subscriptions that tear
    /// themselves down on a terminal state.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(subscription = %self.name, "Unsubscribed");
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_alert(&self, alert: NewSosAlert) -> Result<SosAlert, StoreError>;

    async fn alert(&self, id: Uuid) -> Result<Option<SosAlert>, StoreError>;

    /// All alerts with status `active`, oldest first.
    async fn active_alerts(&self) -> Result<Vec<SosAlert>, StoreError>;

    async fn append_message(&self, message: NewHazardMessage) -> Result<HazardMessage, StoreError>;

    /// The most recent `limit` feed messages, newest first.
    async fn recent_messages(&self, limit: usize) -> Result<Vec<HazardMessage>, StoreError>;

    async fn update_user_location(&self, user_id: &str, location: GeoPoint) -> Result<(), StoreError>;

    fn subscribe_alerts(&self) -> ChangeFeed;
}

#[async_trait]
pub trait RealtimeStore: Send + Sync {
    async fn ambulances(&self) -> Result<Vec<Ambulance>, StoreError>;

    async fn ambulance(&self, id: &str) -> Result<Option<Ambulance>, StoreError>;

    async fn register_ambulance(&self, ambulance: Ambulance) -> Result<(), StoreError>;

    /// Returns `false` when no such unit is registered.
    async fn update_ambulance_position(
        &self,
        id: &str,
        location: GeoPoint,
        speed_kmh: Option<f64>,
    ) -> Result<bool, StoreError>;

    async fn traffic_signals(&self) -> Result<Vec<TrafficSignal>, StoreError>;

    async fn put_traffic_signal(&self, signal: TrafficSignal) -> Result<(), StoreError>;

    /// Returns `false` when no such signal exists.
    async fn set_signal_state(&self, id: &str, state: SignalState) -> Result<bool, StoreError>;

    async fn corridor(&self) -> Result<Option<GreenCorridor>, StoreError>;

    async fn put_corridor(&self, corridor: &GreenCorridor) -> Result<(), StoreError>;

    async fn corridor_notice(&self) -> Result<Option<CorridorNotice>, StoreError>;

    async fn put_corridor_notice(&self, notice: &CorridorNotice) -> Result<(), StoreError>;

    /// Latest board published for operator consoles.
    async fn dispatch_board(&self) -> Result<Option<DispatchBoard>, StoreError>;

    async fn put_dispatch_board(&self, board: &DispatchBoard) -> Result<(), StoreError>;

    fn subscribe_ambulances(&self) -> ChangeFeed;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReceipt {
    pub alert: SosAlert,
    pub ambulance: Ambulance,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    Resolved(SosAlert),
    /// The alert was already resolved and nothing changed.
    AlreadyResolved(SosAlert),
}

impl ResolveOutcome {
    pub fn alert(&self) -> &SosAlert {
        match self {
            ResolveOutcome::Resolved(a) | ResolveOutcome::AlreadyResolved(a) => a,
        }
    }
}

/// Conditional status writes. Each call re-validates the current state of its
/// targets immediately before applying the transition.
#[async_trait]
pub trait DispatchLedger: Send + Sync {
    /// Binds an active alert to an available ambulance in one atomic step.
    /// Fails with `Conflict` if either target is no longer in that state.
    async fn commit_dispatch(&self, alert_id: Uuid, ambulance_id: &str) -> Result<DispatchReceipt, DispatchError>;

    async fn resolve_alert(&self, alert_id: Uuid) -> Result<ResolveOutcome, DispatchError>;

    /// Returns a unit to service and clears its destination.
    async fn release_ambulance(&self, ambulance_id: &str) -> Result<Ambulance, DispatchError>;
}

/// The three store roles, usually all backed by one object.
#[derive(Clone)]
pub struct StoreHandles {
    pub documents: Arc<dyn DocumentStore>,
    pub realtime: Arc<dyn RealtimeStore>,
    pub ledger: Arc<dyn DispatchLedger>,
}

impl StoreHandles {
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: DocumentStore + RealtimeStore + DispatchLedger + 'static,
    {
        Self {
            documents: store.clone(),
            realtime: store.clone(),
            ledger: store,
        }
    }
}
