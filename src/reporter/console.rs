//! Line-oriented driver controls for the vehicle process.
//!
//! Commands:
//!
//! ```text
//! sos                           manual SOS
//! crash <g_force> <delta_v> [airbags] [rollover]
//! hazard <text>                 hazard post to the live feed
//! post <text>                   custom post to the live feed
//! analyze <image path>          AI accident analysis
//! confirm | cancel              answer a running confirmation countdown
//! ```

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::oneshot;
use tracing::{info, warn};
use uuid::Uuid;

use super::analysis::{AccidentAnalyzer, AnalysisOutcome, Decision};
use super::tracker::{AlertTracker, AlertUpdate};
use super::TelemetryReporter;
use crate::error::ReportError;
use crate::models::hazard::MessageKind;
use crate::models::sos_alert::CrashTelemetry;
use crate::store::StoreHandles;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Sos,
    Crash(CrashTelemetry),
    Hazard(String),
    Post(String),
    Analyze(PathBuf),
    Decide(Decision),
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> anyhow::Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let text = |kind: &str| {
            if rest.is_empty() {
                Err(anyhow!("{} needs a message", kind))
            } else {
                Ok(rest.to_string())
            }
        };

        match word.to_ascii_lowercase().as_str() {
            "sos" => Ok(Command::Sos),
            "crash" => {
                let mut args = rest.split_whitespace();
                let g_force = args.next().ok_or_else(|| anyhow!("crash needs <g_force> <delta_v>"))?;
                let delta_v = args.next().ok_or_else(|| anyhow!("crash needs <g_force> <delta_v>"))?;
                let mut crash = CrashTelemetry {
                    g_force: Some(g_force.parse()?),
                    delta_v: Some(delta_v.parse()?),
                    ..CrashTelemetry::default()
                };
                for flag in args {
                    match flag {
                        "airbags" => crash.airbags_deployed = true,
                        "rollover" => crash.rollover_detected = true,
                        other => bail!("unknown crash flag '{}'", other),
                    }
                }
                Ok(Command::Crash(crash))
            }
            "hazard" => Ok(Command::Hazard(text("hazard")?)),
            "post" => Ok(Command::Post(text("post")?)),
            "analyze" => Ok(Command::Analyze(PathBuf::from(text("analyze")?))),
            "confirm" => Ok(Command::Decide(Decision::Confirm)),
            "cancel" => Ok(Command::Decide(Decision::Cancel)),
            "" => bail!("empty command"),
            other => bail!("unknown command '{}'", other),
        }
    }
}

pub struct DriverConsole {
    reporter: Arc<TelemetryReporter>,
    analyzer: Arc<AccidentAnalyzer>,
    tracking: Option<StoreHandles>,
    default_speed_kmh: f64,
    pending: Option<oneshot::Sender<Decision>>,
}

impl DriverConsole {
    pub fn new(reporter: Arc<TelemetryReporter>, analyzer: Arc<AccidentAnalyzer>, default_speed_kmh: f64) -> Self {
        Self {
            reporter,
            analyzer,
            tracking: None,
            default_speed_kmh,
            pending: None,
        }
    }

    /// Follows every alert this vehicle raises through the given stores.
    pub fn with_tracking(mut self, stores: StoreHandles) -> Self {
        self.tracking = Some(stores);
        self
    }

    /// Reads commands until end of input.
    pub async fn run<R: AsyncBufRead + Unpin>(mut self, input: R) -> anyhow::Result<()> {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(command) => self.handle(command).await,
                Err(e) => warn!("{}", e),
            }
        }
        Ok(())
    }

    pub async fn handle(&mut self, command: Command) {
        match command {
            Command::Sos => self.raise("Manual", None).await,
            Command::Crash(crash) => self.raise("Automatic", Some(crash)).await,
            Command::Hazard(text) => self.post(MessageKind::Hazard, text).await,
            Command::Post(text) => self.post(MessageKind::Custom, text).await,
            Command::Analyze(path) => self.analyze(path).await,
            Command::Decide(decision) => {
                let delivered = self.pending.take().is_some_and(|tx| tx.send(decision).is_ok());
                if delivered {
                    info!(?decision, "Decision sent");
                } else {
                    warn!("No analysis is waiting for a decision");
                }
            }
        }
    }

    async fn raise(&self, trigger: &str, crash: Option<CrashTelemetry>) {
        match self.reporter.trigger_sos(trigger, crash).await {
            Ok(alert) => {
                if let Some(id) = alert.id {
                    follow(self.tracking.clone(), id, self.default_speed_kmh);
                }
            }
            Err(ReportError::AlreadySent) => warn!("SOS already sent"),
            Err(e) => warn!("Failed to send SOS: {}", e),
        }
    }

    async fn post(&self, kind: MessageKind, text: String) {
        match self.reporter.post(kind, text, None).await {
            Ok(_) => info!(kind = kind.as_str(), "Posted to the live feed"),
            Err(e) => warn!("Failed to post: {}", e),
        }
    }

    async fn analyze(&mut self, path: PathBuf) {
        if !self.analyzer.is_available() {
            warn!("{}", ReportError::AnalysisUnavailable);
            return;
        }
        let image = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                return;
            }
        };

        let (tx, rx) = oneshot::channel();
        self.pending = Some(tx);
        let analyzer = self.analyzer.clone();
        let tracking = self.tracking.clone();
        let speed = self.default_speed_kmh;
        tokio::spawn(async move {
            match analyzer.analyze(&image, rx).await {
                Ok(AnalysisOutcome::HazardReported { severity }) => {
                    info!(severity, "Accident reported to the live feed")
                }
                Ok(AnalysisOutcome::SosRaised { severity, alert }) => {
                    info!(severity, "Accident reported and SOS raised");
                    if let Some(id) = alert.id {
                        follow(tracking, id, speed);
                    }
                }
                Err(e) => warn!("Accident analysis failed: {}", e),
            }
        });
    }
}

fn dispatched_notice(ambulance_id: &str, eta: Option<u32>) -> String {
    match eta {
        Some(minutes) => format!("Ambulance {} dispatched! ETA: {} min", ambulance_id, minutes),
        None => format!("Ambulance {} dispatched!", ambulance_id),
    }
}

/// Logs dispatch and resolution of one alert until it is resolved.
fn follow(stores: Option<StoreHandles>, alert_id: Uuid, default_speed_kmh: f64) {
    let Some(stores) = stores else {
        return;
    };
    let (handle, mut updates) = AlertTracker::spawn(stores.documents.clone(), alert_id);
    tokio::spawn(async move {
        let _handle = handle;
        while let Some(update) = updates.recv().await {
            match update {
                AlertUpdate::Dispatched { ambulance_id } => {
                    let eta = eta_for(&stores, alert_id, &ambulance_id, default_speed_kmh).await;
                    info!(%alert_id, "{}", dispatched_notice(&ambulance_id, eta));
                }
                AlertUpdate::Resolved => info!(%alert_id, "Incident resolved"),
            }
        }
    });
}

async fn eta_for(stores: &StoreHandles, alert_id: Uuid, ambulance_id: &str, default_speed_kmh: f64) -> Option<u32> {
    let alert = stores.documents.alert(alert_id).await.ok()??;
    let ambulance = stores.realtime.ambulance(ambulance_id).await.ok()??;
    ambulance.eta_minutes_to(&alert.location, default_speed_kmh)
}
