use crate::config::AppConfig;
use crate::error::ReportError;
use crate::models::event::StreamEvent;
use crate::models::position::PositionFrame;
use crate::processor::{delivery_id, MessageRouter};
use crate::reporter::TelemetrySink;
use async_trait::async_trait;
use prost::Message as _;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PRODUCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection and SASL settings shared by the consumer and the producer.
fn base_client_config(config: &AppConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_bootstrap_servers)
        // SASL Configuration
        .set("security.protocol", &config.kafka_security_protocol)
        .set("sasl.mechanism", &config.kafka_sasl_mechanism)
        .set("sasl.username", &config.kafka_username)
        .set("sasl.password", &config.kafka_password);
    client_config
}

/// Starts the Kafka consumer for positions and events, with a circuit breaker.
/// Records are processed in order so a dispatch never overtakes the SOS it refers to.
pub async fn start_kafka_consumer(config: &AppConfig, router: Arc<MessageRouter>) -> anyhow::Result<()> {
    let topics = router.topics();
    info!("Initializing Kafka consumer for topics: {:?}", topics);

    let consumer: StreamConsumer = base_client_config(config)
        .set("group.id", &config.kafka_group_id)
        .set("auto.offset.reset", &config.kafka_auto_offset_reset)
        .create()?;

    consumer.subscribe(&topics)?;
    info!("Subscribed to topics: {:?}", topics);

    let mut consecutive_failures = 0;
    let max_retries = config.kafka_max_retries;
    let cooldown_duration = Duration::from_secs(config.kafka_circuit_breaker_cooldown);

    loop {
        if consecutive_failures >= max_retries {
            warn!(
                "Circuit breaker tripped ({} consecutive failures)! Sleeping for {} seconds...",
                consecutive_failures, config.kafka_circuit_breaker_cooldown
            );
            tokio::time::sleep(cooldown_duration).await;
            consecutive_failures = 0;
            info!("Circuit breaker reset. Resuming consumption.");
        }

        match consumer.recv().await {
            Ok(m) => {
                consecutive_failures = 0;

                let payload = match m.payload() {
                    None => {
                        warn!("Received empty payload from Kafka on {}", m.topic());
                        continue;
                    }
                    Some(p) => p,
                };

                let id = delivery_id(m.topic(), m.partition(), m.offset());
                if let Err(e) = router.route(m.topic(), payload, Some(id)).await {
                    error!("Error processing message from {}: {}", m.topic(), e);
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                error!(
                    "Kafka error: {}. Incrementing failure count ({} / {})",
                    e, consecutive_failures, max_retries
                );
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }
}

/// Publishes vehicle traffic: protobuf positions and JSON events, both keyed
/// by vehicle so each vehicle's records stay ordered within a partition.
pub struct EventProducer {
    producer: FutureProducer,
    position_topic: String,
    event_topic: String,
    key: String,
}

impl EventProducer {
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let producer: FutureProducer = base_client_config(config)
            .set("message.timeout.ms", "10000")
            .create()?;
        info!(
            "Kafka producer ready for topics {} and {}",
            config.kafka_position_topic, config.kafka_event_topic
        );
        Ok(Self {
            producer,
            position_topic: config.kafka_position_topic.clone(),
            event_topic: config.kafka_event_topic.clone(),
            key: config.vehicle_id.clone(),
        })
    }

    async fn send(&self, topic: &str, payload: &[u8]) -> Result<(), ReportError> {
        let record = FutureRecord::to(topic).key(&self.key).payload(payload);
        match self.producer.send(record, PRODUCE_TIMEOUT).await {
            Ok((partition, offset)) => {
                debug!(topic, partition, offset, "Delivered");
                Ok(())
            }
            Err((e, _)) => Err(ReportError::Publish(e.to_string())),
        }
    }
}

#[async_trait]
impl TelemetrySink for EventProducer {
    async fn publish_position(&self, frame: &PositionFrame) -> Result<(), ReportError> {
        self.send(&self.position_topic, &frame.encode_to_vec()).await
    }

    async fn publish_event(&self, event: &StreamEvent) -> Result<(), ReportError> {
        let payload = serde_json::to_vec(event)?;
        self.send(&self.event_topic, &payload).await
    }
}
