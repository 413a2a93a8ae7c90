use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::matcher::{plan, DispatchBoard};
use crate::fleet::FleetTracker;
use crate::registry::AlertRegistry;
use crate::store::RealtimeStore;

/// Recomputes the dispatch board whenever either snapshot changes.
pub struct Coordinator {
    registry: AlertRegistry,
    fleet: FleetTracker,
    board: watch::Sender<DispatchBoard>,
    publisher: Option<Arc<dyn RealtimeStore>>,
}

impl Coordinator {
    pub fn new(registry: AlertRegistry, fleet: FleetTracker) -> Self {
        let (board, _) = watch::channel(DispatchBoard::Idle);
        Self {
            registry,
            fleet,
            board,
            publisher: None,
        }
    }

    /// Also writes every new board to the real-time store, where operator
    /// consoles read it.
    pub fn publish_to(mut self, store: Arc<dyn RealtimeStore>) -> Self {
        self.publisher = Some(store);
        self
    }

    pub fn board(&self) -> watch::Receiver<DispatchBoard> {
        self.board.subscribe()
    }

    pub fn recompute(&self) -> DispatchBoard {
        let alerts = self.registry.active_alerts();
        let units = self.fleet.all();
        let next = plan(&alerts, &units);

        let (previous_mode, unchanged) = {
            let current = self.board.borrow();
            (current.mode(), *current == next)
        };
        if previous_mode != next.mode() {
            match &next {
                DispatchBoard::Idle => info!("No active incidents"),
                DispatchBoard::Single { candidates, .. } => {
                    info!(candidates = candidates.len(), "Single incident detected. Manual dispatch.")
                }
                DispatchBoard::Multi { suggestions, .. } => info!(
                    incidents = alerts.len(),
                    suggestions = suggestions.len(),
                    "Multiple incidents ({})! Suggestions generated.",
                    alerts.len()
                ),
            }
        }
        if !unchanged {
            log_board(&next);
        }

        self.board.send_replace(next.clone());
        next
    }

    async fn publish(&self, board: &DispatchBoard) {
        let Some(store) = &self.publisher else {
            return;
        };
        match store.put_dispatch_board(board).await {
            Ok(()) => debug!(mode = board.mode(), "Dispatch board published"),
            Err(e) => warn!("Failed to publish dispatch board: {}", e),
        }
    }

    /// Runs until both snapshot sources are gone.
    pub async fn run(self) {
        let mut alerts = self.registry.changes();
        let mut units = self.fleet.changes();
        let mut published: Option<DispatchBoard> = None;

        loop {
            let next = self.recompute();
            if published.as_ref() != Some(&next) {
                self.publish(&next).await;
                published = Some(next);
            }

            tokio::select! {
                res = alerts.changed() => if res.is_err() { break },
                res = units.changed() => if res.is_err() { break },
            }
        }
        info!("Coordinator stopped");
    }
}

fn log_board(board: &DispatchBoard) {
    match board {
        DispatchBoard::Idle => {}
        DispatchBoard::Single {
            alert_id,
            severity,
            candidates,
        } => {
            if candidates.is_empty() {
                warn!(%alert_id, %severity, "No available ambulances for incident");
            }
            for (rank, c) in candidates.iter().enumerate() {
                info!(
                    %alert_id,
                    rank = rank + 1,
                    ambulance_id = %c.ambulance_id,
                    distance_m = c.distance_m.round(),
                    "Candidate"
                );
            }
        }
        DispatchBoard::Multi {
            suggestions,
            unassigned,
        } => {
            for s in suggestions {
                info!(
                    alert_id = %s.alert_id,
                    severity = %s.severity,
                    ambulance_id = %s.ambulance_id,
                    distance_m = s.distance_m.round(),
                    "Suggested dispatch"
                );
            }
            if !unassigned.is_empty() {
                warn!(unassigned = unassigned.len(), "Not enough available ambulances for all incidents");
            }
        }
    }
}
