use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::debug;

use crate::config::KafkaConfig;
use crate::error::{EconomyError, Result};
use crate::models::MarketClearedEvent;

/// Outbound channel for clearing results
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &MarketClearedEvent) -> Result<()>;
}

/// Publishes market-cleared events to the simulation event topic
pub struct MarketEventPublisher {
    producer: FutureProducer,
    topic: String,
}

impl MarketEventPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: config.event_topic.clone(),
        })
    }
}

#[async_trait]
impl EventPublisher for MarketEventPublisher {
    async fn publish(&self, event: &MarketClearedEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let record = FutureRecord::to(&self.topic)
            .payload(&payload)
            .key(&event.market_id);

        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| EconomyError::Broker(e.to_string()))?;

        debug!("📤 Published {} for {}", event.event_type, event.market_id);
        Ok(())
    }
}
