//! Vehicle side: periodic position pushes, SOS triggering, AI accident
//! reports and tracking of the vehicle's own alert.

pub mod analysis;
pub mod console;
pub mod location;
pub mod tracker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ReportError;
use crate::models::event::{FeedPost, StreamEvent};
use crate::models::hazard::{AiAnalysis, MessageKind};
use crate::models::position::{PositionFrame, VehicleKind};
use crate::models::sos_alert::{CrashTelemetry, NewSosAlert, SenderInfo, VehicleData};

pub use analysis::{AccidentAnalyzer, AnalysisOutcome, Decision, DetectionService};
pub use location::{locate, Fix, LocationProvider, Locator, StaticLocationProvider};
pub use console::{Command, DriverConsole};
pub use tracker::{AlertTracker, AlertUpdate};

/// Outbound channel for everything a vehicle reports.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn publish_position(&self, frame: &PositionFrame) -> Result<(), ReportError>;

    async fn publish_event(&self, event: &StreamEvent) -> Result<(), ReportError>;
}

#[derive(Debug, Clone)]
pub struct ReporterIdentity {
    pub vehicle_id: String,
    pub kind: VehicleKind,
    pub sender: SenderInfo,
}

/// Cabin readings for vehicles without a real sensor bus.
pub fn synthetic_vitals<R: Rng + ?Sized>(rng: &mut R) -> VehicleData {
    VehicleData {
        battery: Some(rng.gen_range(70..=100)),
        passengers: Some(rng.gen_range(1..=4)),
        vitals: Some(rng.gen_range(60..=100)),
        crash: None,
    }
}

pub struct TelemetryReporter {
    identity: ReporterIdentity,
    locator: Arc<Locator>,
    sink: Arc<dyn TelemetrySink>,
    interval: Duration,
    sos_sent: AtomicBool,
}

impl TelemetryReporter {
    pub fn new(
        identity: ReporterIdentity,
        locator: Arc<Locator>,
        sink: Arc<dyn TelemetrySink>,
        interval: Duration,
    ) -> Self {
        Self {
            identity,
            locator,
            sink,
            interval,
            sos_sent: AtomicBool::new(false),
        }
    }

    pub fn identity(&self) -> &ReporterIdentity {
        &self.identity
    }

    pub fn sos_sent(&self) -> bool {
        self.sos_sent.load(Ordering::SeqCst)
    }

    pub async fn report_once(&self) -> Result<PositionFrame, ReportError> {
        let fix = self.locator.locate().await;
        let mut frame = PositionFrame::new(&self.identity.vehicle_id, self.identity.kind, fix.point);
        frame.is_fallback = fix.is_fallback;
        self.sink.publish_position(&frame).await?;
        Ok(frame)
    }

    /// Pushes a position every interval until the task is cancelled. A failed
    /// push is logged and the next tick tries again.
    pub async fn run(&self) {
        info!(
            vehicle_id = %self.identity.vehicle_id,
            interval_secs = self.interval.as_secs(),
            "Position reporting started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.report_once().await {
                warn!("Failed to publish position: {}", e);
            }
        }
    }

    /// Raises this session's SOS. Only one may be sent; a failed publish
    /// re-arms the trigger so the driver can try again.
    pub async fn trigger_sos(
        &self,
        trigger_method: &str,
        crash: Option<CrashTelemetry>,
    ) -> Result<NewSosAlert, ReportError> {
        if self.sos_sent.swap(true, Ordering::SeqCst) {
            return Err(ReportError::AlreadySent);
        }

        let fix = self.locator.locate().await;
        let mut vehicle_data = synthetic_vitals(&mut rand::thread_rng());
        vehicle_data.crash = crash;

        let alert = NewSosAlert {
            id: Some(Uuid::new_v4()),
            sender_info: self.identity.sender.clone(),
            location: fix.point,
            vehicle_data,
            trigger_method: trigger_method.to_string(),
        };

        if let Err(e) = self.sink.publish_event(&StreamEvent::Sos(alert.clone())).await {
            self.sos_sent.store(false, Ordering::SeqCst);
            return Err(e);
        }
        info!(
            vehicle_id = %self.identity.vehicle_id,
            trigger = trigger_method,
            fallback_location = fix.is_fallback,
            "SOS sent"
        );
        Ok(alert)
    }

    /// Posts a hazard or custom message to the live feed.
    pub async fn post(
        &self,
        kind: MessageKind,
        message: String,
        ai_analysis: Option<AiAnalysis>,
    ) -> Result<FeedPost, ReportError> {
        let fix = self.locator.locate().await;
        let post = FeedPost {
            sender_info: self.identity.sender.clone(),
            location: fix.point,
            message,
            ai_analysis,
        };
        let event = match kind {
            MessageKind::Hazard => StreamEvent::Hazard(post.clone()),
            MessageKind::Custom => StreamEvent::Custom(post.clone()),
        };
        self.sink.publish_event(&event).await?;
        Ok(post)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct RecordingSink {
        pub positions: Mutex<Vec<PositionFrame>>,
        pub events: Mutex<Vec<StreamEvent>>,
        pub fail: AtomicBool,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<StreamEvent> {
            self.events.lock().clone()
        }
    }

    #[async_trait]
    impl TelemetrySink for RecordingSink {
        async fn publish_position(&self, frame: &PositionFrame) -> Result<(), ReportError> {
            self.positions.lock().push(frame.clone());
            Ok(())
        }

        async fn publish_event(&self, event: &StreamEvent) -> Result<(), ReportError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ReportError::Publish("broker down".to_string()));
            }
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    pub fn reporter(sink: Arc<RecordingSink>, position: Option<crate::models::location::GeoPoint>) -> TelemetryReporter {
        let locator = Locator::new(
            Arc::new(StaticLocationProvider::new(position)),
            Duration::from_millis(200),
            crate::models::location::FALLBACK_LOCATION,
        );
        TelemetryReporter::new(
            ReporterIdentity {
                vehicle_id: "EV-42".to_string(),
                kind: VehicleKind::Passenger,
                sender: crate::testing::sender("meera"),
            },
            Arc::new(locator),
            sink,
            Duration::from_secs(5),
        )
    }
}
