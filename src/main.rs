use std::sync::Arc;

use anyhow::Context;
use futures::future::try_join_all;
use sos_dispatch::config::{AppConfig, ServiceRole, StoreBackend};
use sos_dispatch::corridor::CorridorPropagator;
use sos_dispatch::db::{self, PgStore};
use sos_dispatch::dispatch::{Coordinator, Dispatcher};
use sos_dispatch::fleet::FleetTracker;
use sos_dispatch::kafka;
use sos_dispatch::models::sos_alert::SenderInfo;
use sos_dispatch::models::traffic_signal::default_signals;
use sos_dispatch::processor::{EventProcessor, MessageRouter, PositionProcessor};
use sos_dispatch::registry::AlertRegistry;
use sos_dispatch::reporter::{AccidentAnalyzer, DriverConsole, Locator, ReporterIdentity, StaticLocationProvider, TelemetryReporter};
use sos_dispatch::store::memory::MemoryStore;
use sos_dispatch::store::{RealtimeStore, StoreHandles, SubscriptionHandle};
use tokio::io::BufReader;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    match config.service_role {
        ServiceRole::Coordinator => run_coordinator(config).await,
        ServiceRole::Reporter => run_reporter(config).await,
    }
}

async fn run_coordinator(config: AppConfig) -> anyhow::Result<()> {
    info!("Starting SOS Dispatch Coordinator ({:?} store)...", config.store_backend);

    // The listener handle must outlive the consumer loop.
    let (stores, _listener): (StoreHandles, Option<SubscriptionHandle>) = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = db::init_pool(&config.database_url)
                .await
                .context("failed to connect to database")?;
            info!("Connected to database");
            let store = Arc::new(PgStore::new(pool));
            let listener = store.spawn_listener();
            (StoreHandles::from_shared(store), Some(listener))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; state is lost on restart");
            (StoreHandles::from_shared(Arc::new(MemoryStore::new())), None)
        }
    };

    seed_traffic_signals(stores.realtime.as_ref()).await?;

    let registry = AlertRegistry::new();
    let fleet = FleetTracker::new();
    let _alerts_sync = registry.sync(stores.documents.clone());
    let _fleet_sync = fleet.sync(stores.realtime.clone());
    tokio::spawn(
        Coordinator::new(registry, fleet)
            .publish_to(stores.realtime.clone())
            .run(),
    );

    match stores.documents.recent_messages(config.feed_limit).await {
        Ok(feed) => info!("{} recent feed messages on startup", feed.len()),
        Err(e) => warn!("Could not read the live feed: {}", e),
    }

    let corridor = Arc::new(CorridorPropagator::new(stores.realtime.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        stores.ledger.clone(),
        corridor,
        config.default_ambulance_speed_kmh,
    ));
    let router = Arc::new(MessageRouter::new(
        config.kafka_position_topic.clone(),
        config.kafka_event_topic.clone(),
        PositionProcessor::new(stores.documents.clone(), stores.realtime.clone()),
        EventProcessor::new(stores.documents.clone(), stores.realtime.clone(), dispatcher),
    ));

    // Start Kafka
    tokio::select! {
        res = kafka::start_kafka_consumer(&config, router) => res?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}

async fn seed_traffic_signals(store: &dyn RealtimeStore) -> anyhow::Result<()> {
    if !store.traffic_signals().await?.is_empty() {
        return Ok(());
    }
    let signals = default_signals();
    info!("Seeding {} default traffic signals", signals.len());
    try_join_all(signals.into_iter().map(|signal| store.put_traffic_signal(signal))).await?;
    Ok(())
}

async fn run_reporter(config: AppConfig) -> anyhow::Result<()> {
    info!("Starting position reporter for vehicle {}...", config.vehicle_id);

    let producer = Arc::new(kafka::EventProducer::new(&config)?);
    let locator = Arc::new(Locator::new(
        Arc::new(StaticLocationProvider::new(config.static_location)),
        config.geolocation_timeout(),
        config.fallback_location,
    ));
    let identity = ReporterIdentity {
        vehicle_id: config.vehicle_id.clone(),
        kind: config.vehicle_kind,
        sender: SenderInfo {
            user_id: config.vehicle_id.clone(),
            username: config.vehicle_username.clone(),
            reg_number: config.vehicle_reg_number.clone(),
        },
    };
    let reporter = Arc::new(TelemetryReporter::new(identity, locator, producer, config.report_interval()));

    // No detection service is bundled; `analyze` answers with AnalysisUnavailable.
    let analyzer = Arc::new(AccidentAnalyzer::new(None, reporter.clone(), config.sos_confirm_countdown()));
    if !analyzer.is_available() {
        warn!("Accident analysis disabled: no detection service configured");
    }

    let mut console = DriverConsole::new(reporter.clone(), analyzer, config.default_ambulance_speed_kmh);
    // Alert tracking needs change notifications while the process runs.
    let mut _listener: Option<SubscriptionHandle> = None;
    match config.store_backend {
        StoreBackend::Postgres => match db::init_pool(&config.database_url).await {
            Ok(pool) => {
                info!("Alert tracking enabled");
                let store = Arc::new(PgStore::new(pool));
                _listener = Some(store.spawn_listener());
                console = console.with_tracking(StoreHandles::from_shared(store));
            }
            Err(e) => warn!("Alert tracking disabled, database unreachable: {}", e),
        },
        StoreBackend::Memory => info!("Alert tracking disabled for the in-memory store"),
    }

    // Driver commands arrive on stdin. Reporting continues after it closes.
    let controls = async move {
        if let Err(e) = console.run(BufReader::new(tokio::io::stdin())).await {
            warn!("Driver console failed: {}", e);
        }
        info!("Driver console closed");
        std::future::pending::<()>().await
    };

    tokio::select! {
        _ = reporter.run() => {}
        _ = controls => {}
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    Ok(())
}
