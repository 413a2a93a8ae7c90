//! Turns Postgres `NOTIFY` traffic from the change triggers into store change
//! feeds.

use std::time::Duration;

use serde::Deserialize;
use sqlx::postgres::PgListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::DbPool;
use crate::store::{ChangeKind, ChangeRecord, SubscriptionHandle};

pub const ALERT_CHANNEL: &str = "sos_alerts_changes";
pub const AMBULANCE_CHANNEL: &str = "ambulances_changes";

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct Notification {
    op: String,
    key: String,
}

fn parse_notification(payload: &str) -> Option<ChangeRecord> {
    let n: Notification = match serde_json::from_str(payload) {
        Ok(n) => n,
        Err(e) => {
            warn!("Unparseable change notification '{}': {}", payload, e);
            return None;
        }
    };
    let kind = match n.op.as_str() {
        "INSERT" => ChangeKind::Added,
        "UPDATE" => ChangeKind::Modified,
        "DELETE" => ChangeKind::Removed,
        other => {
            warn!("Unknown change operation '{}'", other);
            return None;
        }
    };
    Some(ChangeRecord::new(kind, n.key))
}

fn resync(alerts: &broadcast::Sender<ChangeRecord>, ambulances: &broadcast::Sender<ChangeRecord>) {
    // No subscribers is fine; send only fails then.
    let _ = alerts.send(ChangeRecord::resync());
    let _ = ambulances.send(ChangeRecord::resync());
}

pub fn spawn(
    pool: DbPool,
    alerts: broadcast::Sender<ChangeRecord>,
    ambulances: broadcast::Sender<ChangeRecord>,
) -> SubscriptionHandle {
    let task = tokio::spawn(async move {
        loop {
            let mut listener = match PgListener::connect_with(&pool).await {
                Ok(l) => l,
                Err(e) => {
                    error!("Failed to open change listener: {}. Retrying in {:?}", e, RECONNECT_DELAY);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };
            if let Err(e) = listener.listen_all([ALERT_CHANNEL, AMBULANCE_CHANNEL]).await {
                error!("Failed to LISTEN on change channels: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
            info!("Listening for store changes on {} and {}", ALERT_CHANNEL, AMBULANCE_CHANNEL);
            // Anything may have changed while nobody was listening.
            resync(&alerts, &ambulances);

            loop {
                match listener.try_recv().await {
                    Ok(Some(notification)) => {
                        let Some(record) = parse_notification(notification.payload()) else {
                            continue;
                        };
                        debug!(channel = notification.channel(), key = ?record.key, "Store change");
                        let target = match notification.channel() {
                            ALERT_CHANNEL => &alerts,
                            AMBULANCE_CHANNEL => &ambulances,
                            _ => continue,
                        };
                        let _ = target.send(record);
                    }
                    Ok(None) => {
                        // The listener reconnected on its own; notifications in between are lost.
                        warn!("Change listener connection was lost, resyncing");
                        resync(&alerts, &ambulances);
                    }
                    Err(e) => {
                        error!("Change listener failed: {}", e);
                        break;
                    }
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    });

    SubscriptionHandle::new("pg-change-listener", task)
}
