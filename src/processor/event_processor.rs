use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::DispatchError;
use crate::models::event::{FeedPost, StreamEvent};
use crate::models::hazard::{MessageKind, NewHazardMessage};
use crate::severity::classify_alert;
use crate::store::{DocumentStore, RealtimeStore};

pub struct EventProcessor {
    documents: Arc<dyn DocumentStore>,
    realtime: Arc<dyn RealtimeStore>,
    dispatcher: Arc<Dispatcher>,
}

impl EventProcessor {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        realtime: Arc<dyn RealtimeStore>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            documents,
            realtime,
            dispatcher,
        }
    }

    /// Handles one JSON event. `delivery_id` is a stable id for this delivery
    /// and becomes the alert id of an SOS that did not pick one itself.
    /// Only store failures are returned as errors; bad input and rejected
    /// commands are logged and dropped.
    pub async fn process(&self, payload: &[u8], delivery_id: Option<Uuid>) -> anyhow::Result<()> {
        let event: StreamEvent = match serde_json::from_slice(payload) {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to parse event: {}", e);
                return Ok(());
            }
        };

        match event {
            StreamEvent::Sos(mut sos) => {
                if !sos.location.is_valid() {
                    warn!("SOS from {} has invalid location {:?}, skipping", sos.sender_info.username, sos.location);
                    return Ok(());
                }
                if sos.id.is_none() {
                    sos.id = delivery_id;
                }
                let alert = self.documents.create_alert(sos).await?;
                info!(
                    alert_id = %alert.id,
                    sender = %alert.sender_info.username,
                    tier = %classify_alert(&alert),
                    trigger = %alert.trigger_method,
                    "SOS alert registered"
                );
            }
            StreamEvent::Hazard(post) => self.append(MessageKind::Hazard, post).await?,
            StreamEvent::Custom(post) => self.append(MessageKind::Custom, post).await?,
            StreamEvent::Dispatch {
                alert_id,
                ambulance_id,
            } => settle(self.dispatcher.dispatch(alert_id, &ambulance_id).await)?,
            StreamEvent::Resolve { alert_id } => settle(self.dispatcher.resolve(alert_id).await)?,
            StreamEvent::ReleaseAmbulance { ambulance_id } => {
                settle(self.dispatcher.release_ambulance(&ambulance_id).await)?
            }
            StreamEvent::RegisterAmbulance { ambulance } => {
                if !ambulance.location.is_valid() {
                    warn!("Ambulance {} has invalid location, not registered", ambulance.id);
                    return Ok(());
                }
                info!(ambulance_id = %ambulance.id, status = %ambulance.status, "Ambulance registered");
                self.realtime.register_ambulance(ambulance).await?;
            }
            StreamEvent::SetTrafficSignal { signal_id, state } => {
                if !self.realtime.set_signal_state(&signal_id, state).await? {
                    warn!("Unknown traffic signal {}", signal_id);
                }
            }
        }
        Ok(())
    }

    async fn append(&self, kind: MessageKind, post: FeedPost) -> anyhow::Result<()> {
        let message = self
            .documents
            .append_message(NewHazardMessage {
                kind,
                message: post.message,
                ai_analysis: post.ai_analysis,
                sender_info: post.sender_info,
                location: post.location,
            })
            .await?;
        info!(message_id = %message.id, kind = kind.as_str(), "Feed message posted");
        Ok(())
    }
}

/// Rejections are expected under concurrency and are not processing failures.
fn settle<T>(result: Result<T, DispatchError>) -> anyhow::Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(DispatchError::Store(e)) => Err(e.into()),
        Err(e) => {
            warn!("Command rejected: {}", e);
            Ok(())
        }
    }
}
