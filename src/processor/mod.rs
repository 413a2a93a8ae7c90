pub mod event_processor;
pub mod position_processor;

use tracing::warn;
use uuid::Uuid;

pub use event_processor::EventProcessor;
pub use position_processor::PositionProcessor;

/// Sends each consumed record to the processor for its topic.
pub struct MessageRouter {
    position_topic: String,
    event_topic: String,
    positions: PositionProcessor,
    events: EventProcessor,
}

impl MessageRouter {
    pub fn new(
        position_topic: impl Into<String>,
        event_topic: impl Into<String>,
        positions: PositionProcessor,
        events: EventProcessor,
    ) -> Self {
        Self {
            position_topic: position_topic.into(),
            event_topic: event_topic.into(),
            positions,
            events,
        }
    }

    pub fn topics(&self) -> [&str; 2] {
        [self.position_topic.as_str(), self.event_topic.as_str()]
    }

    pub async fn route(&self, topic: &str, payload: &[u8], delivery_id: Option<Uuid>) -> anyhow::Result<()> {
        if topic == self.position_topic {
            self.positions.process(payload).await
        } else if topic == self.event_topic {
            self.events.process(payload, delivery_id).await
        } else {
            warn!("Message on unexpected topic {}", topic);
            Ok(())
        }
    }
}

/// Stable id for one record, so redeliveries of it map to the same alert.
pub fn delivery_id(topic: &str, partition: i32, offset: i64) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}/{}/{}", topic, partition, offset).as_bytes())
}
