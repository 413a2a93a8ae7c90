use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::sos_alert::{AlertStatus, SosAlert};
use crate::store::{DocumentStore, SubscriptionHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertUpdate {
    Dispatched { ambulance_id: String },
    Resolved,
}

/// Follows one alert from the vehicle that raised it.
pub struct AlertTracker;

impl AlertTracker {
    /// Emits `Dispatched` at most once, then `Resolved`, after which the
    /// subscription ends on its own.
    pub fn spawn(store: Arc<dyn DocumentStore>, alert_id: Uuid) -> (SubscriptionHandle, mpsc::Receiver<AlertUpdate>) {
        let (tx, rx) = mpsc::channel(4);
        let mut feed = store.subscribe_alerts();
        let key = alert_id.to_string();

        let task = tokio::spawn(async move {
            let mut dispatched = false;
            loop {
                match store.alert(alert_id).await {
                    Ok(Some(alert)) => {
                        let updates = pending_updates(&alert, &mut dispatched);
                        let done = updates.contains(&AlertUpdate::Resolved);
                        for update in updates {
                            if tx.send(update).await.is_err() {
                                debug!(alert_id = %alert_id, "Tracker receiver dropped");
                                return;
                            }
                        }
                        if done {
                            info!(alert_id = %alert_id, "Alert resolved, tracking finished");
                            return;
                        }
                    }
                    Ok(None) => debug!(alert_id = %alert_id, "Alert not visible yet"),
                    Err(e) => warn!(alert_id = %alert_id, "Failed to read tracked alert: {}", e),
                }

                loop {
                    match feed.recv().await {
                        Ok(record) if record.concerns(&key) => break,
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        });

        (SubscriptionHandle::new(format!("alert-tracker:{}", alert_id), task), rx)
    }
}

fn pending_updates(alert: &SosAlert, dispatched: &mut bool) -> Vec<AlertUpdate> {
    let mut updates = Vec::new();
    if !*dispatched {
        if let Some(id) = &alert.dispatched_ambulance_id {
            *dispatched = true;
            updates.push(AlertUpdate::Dispatched {
                ambulance_id: id.clone(),
            });
        }
    }
    if alert.status == AlertStatus::Resolved {
        updates.push(AlertUpdate::Resolved);
    }
    updates
}
