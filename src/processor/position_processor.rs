use std::sync::Arc;

use prost::Message;
use tracing::{debug, warn};

use crate::models::position::{PositionFrame, VehicleKind};
use crate::store::{DocumentStore, RealtimeStore};

/// Applies protobuf position frames to the stores. Ambulances move in the
/// real-time store, passenger vehicles in `users`.
pub struct PositionProcessor {
    documents: Arc<dyn DocumentStore>,
    realtime: Arc<dyn RealtimeStore>,
}

impl PositionProcessor {
    pub fn new(documents: Arc<dyn DocumentStore>, realtime: Arc<dyn RealtimeStore>) -> Self {
        Self { documents, realtime }
    }

    pub async fn process(&self, payload: &[u8]) -> anyhow::Result<()> {
        let frame = match PositionFrame::decode(payload) {
            Ok(f) => f,
            Err(e) => {
                warn!("Failed to decode position frame: {}", e);
                return Ok(());
            }
        };

        if frame.vehicle_id.trim().is_empty() {
            warn!("Position frame missing vehicle_id, skipping");
            return Ok(());
        }
        let location = frame.location();
        if !location.is_valid() {
            warn!("Invalid position {:?} from {}", location, frame.vehicle_id);
            return Ok(());
        }
        if frame.is_fallback {
            debug!(vehicle_id = %frame.vehicle_id, "Position is the fallback coordinate");
        }

        match VehicleKind::try_from(frame.kind) {
            Ok(VehicleKind::Ambulance) => {
                let known = self
                    .realtime
                    .update_ambulance_position(&frame.vehicle_id, location, frame.speed_kmh)
                    .await?;
                if !known {
                    warn!("Position for unregistered ambulance {}, skipping", frame.vehicle_id);
                }
            }
            Ok(VehicleKind::Passenger) => {
                self.documents
                    .update_user_location(&frame.vehicle_id, location)
                    .await?;
            }
            Ok(VehicleKind::Unspecified) | Err(_) => {
                warn!("Position frame from {} has unknown vehicle kind {}", frame.vehicle_id, frame.kind);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::location::GeoPoint;
    use crate::store::memory::MemoryStore;
    use crate::testing;

    fn processor(store: &Arc<MemoryStore>) -> PositionProcessor {
        PositionProcessor::new(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn ambulance_frame_moves_the_unit() {
        let store = Arc::new(MemoryStore::new());
        store
            .register_ambulance(testing::ambulance("AMB-1", GeoPoint::new(12.90, 77.60)))
            .await
            .unwrap();

        let mut frame = PositionFrame::new("AMB-1", VehicleKind::Ambulance, GeoPoint::new(12.95, 77.61));
        frame.speed_kmh = Some(42.0);
        processor(&store).process(&frame.encode_to_vec()).await.unwrap();

        let unit = store.ambulance("AMB-1").await.unwrap().unwrap();
        assert_eq!(unit.location, GeoPoint::new(12.95, 77.61));
        assert_eq!(unit.speed_kmh, Some(42.0));
    }

    #[tokio::test]
    async fn unregistered_ambulance_is_not_created() {
        let store = Arc::new(MemoryStore::new());
        let frame = PositionFrame::new("AMB-X", VehicleKind::Ambulance, GeoPoint::new(12.95, 77.61));
        processor(&store).process(&frame.encode_to_vec()).await.unwrap();
        assert!(store.ambulances().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn passenger_frame_updates_user_location() {
        let store = Arc::new(MemoryStore::new());
        let frame = PositionFrame::new("user-meera", VehicleKind::Passenger, GeoPoint::new(12.93, 77.62));
        processor(&store).process(&frame.encode_to_vec()).await.unwrap();
        assert_eq!(store.user_location("user-meera"), Some(GeoPoint::new(12.93, 77.62)));
    }

    #[tokio::test]
    async fn garbage_and_bad_coordinates_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let p = processor(&store);
        p.process(b"\xff\xff\xff not protobuf").await.unwrap();

        let frame = PositionFrame::new("user-x", VehicleKind::Passenger, GeoPoint::new(95.0, 77.62));
        p.process(&frame.encode_to_vec()).await.unwrap();
        assert!(store.user_location("user-x").is_none());
    }
}
