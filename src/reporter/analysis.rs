use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::TelemetryReporter;
use crate::error::ReportError;
use crate::models::hazard::{AiAnalysis, Detection, MessageKind};
use crate::models::sos_alert::NewSosAlert;
use crate::severity::{assess_detections, VisionRoute};

/// Object detection over a single still image.
#[async_trait]
pub trait DetectionService: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<Vec<Detection>, ReportError>;
}

/// The driver's answer during the confirmation countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    HazardReported { severity: u8 },
    SosRaised { severity: u8, alert: NewSosAlert },
}

pub struct AccidentAnalyzer {
    detector: Option<Arc<dyn DetectionService>>,
    reporter: Arc<TelemetryReporter>,
    countdown: Duration,
}

impl AccidentAnalyzer {
    pub fn new(
        detector: Option<Arc<dyn DetectionService>>,
        reporter: Arc<TelemetryReporter>,
        countdown: Duration,
    ) -> Self {
        Self {
            detector,
            reporter,
            countdown,
        }
    }

    pub fn is_available(&self) -> bool {
        self.detector.is_some()
    }

    /// Scores the image and reports it. Above the SOS threshold the driver has
    /// `countdown` to cancel; silence counts as confirmation.
    pub async fn analyze(
        &self,
        image: &[u8],
        decision: oneshot::Receiver<Decision>,
    ) -> Result<AnalysisOutcome, ReportError> {
        let detector = self.detector.as_ref().ok_or(ReportError::AnalysisUnavailable)?;
        let detections = detector.detect(image).await?;
        let assessment = assess_detections(&detections);
        let severity = assessment.score;
        info!(severity, tier = %assessment.tier, objects = detections.len(), "Accident image analyzed");

        let analysis = AiAnalysis {
            severity,
            detections,
            timestamp: Utc::now(),
        };
        let message = report_message(&analysis);

        let escalate = match assessment.route {
            VisionRoute::HazardOnly => false,
            VisionRoute::ConfirmSos => self.await_decision(decision).await == Decision::Confirm,
        };

        self.reporter
            .post(MessageKind::Hazard, message, Some(analysis))
            .await?;
        if !escalate {
            return Ok(AnalysisOutcome::HazardReported { severity });
        }

        let trigger = format!("AI Analysis (Severity: {}/10)", severity);
        match self.reporter.trigger_sos(&trigger, None).await {
            Ok(alert) => Ok(AnalysisOutcome::SosRaised { severity, alert }),
            Err(ReportError::AlreadySent) => {
                warn!(severity, "SOS already sent this session, reported hazard only");
                Ok(AnalysisOutcome::HazardReported { severity })
            }
            Err(e) => Err(e),
        }
    }

    async fn await_decision(&self, decision: oneshot::Receiver<Decision>) -> Decision {
        let countdown = tokio::time::sleep(self.countdown);
        tokio::pin!(countdown);
        // A dropped sender disables the first branch and the countdown runs out.
        tokio::select! {
            Ok(d) = decision => d,
            _ = &mut countdown => {
                info!("Confirmation countdown expired, escalating");
                Decision::Confirm
            }
        }
    }
}

fn report_message(analysis: &AiAnalysis) -> String {
    let objects = analysis
        .detections
        .iter()
        .map(|d| d.class.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Car Accident detected via AI analysis. Severity: {}/10. Objects detected: {}",
        analysis.severity, objects
    )
}
