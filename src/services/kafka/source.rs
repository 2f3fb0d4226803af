//! Where ticks come from.
//!
//! [`KafkaTickSource`] reads the world tick topic with manual offset
//! commits. [`MemoryTickSource`] is an in-process queue with the same
//! commit/redeliver contract, fed by the local ticker and by tests.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;
use crate::error::{EconomyError, Result};
use crate::models::TickEvent;

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// One raw message and its position in the stream
#[derive(Debug, Clone, PartialEq)]
pub struct TickMessage {
    pub payload: Vec<u8>,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

#[async_trait]
pub trait TickSource: Send + Sync {
    async fn connect(&self) -> Result<()>;

    /// Wait for the next message. Callers bound the wait themselves.
    async fn next_message(&self) -> Result<TickMessage>;

    /// Mark `message` as consumed so it is not delivered again
    async fn commit(&self, message: &TickMessage) -> Result<()>;

    /// Make `message` the next one delivered
    async fn redeliver(&self, message: &TickMessage) -> Result<()>;

    async fn close(&self);

    /// True once a connection has been established at least once
    fn is_connected(&self) -> bool;
}

pub struct KafkaTickSource {
    consumer: Arc<StreamConsumer>,
    topic: String,
    connected: AtomicBool,
}

impl KafkaTickSource {
    /// Build the consumer. Nothing is dialed until [`TickSource::connect`].
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &config.group_id)
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("heartbeat.interval.ms", config.heartbeat_interval_ms.to_string())
            .create()?;

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: config.tick_topic.clone(),
            connected: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl TickSource for KafkaTickSource {
    async fn connect(&self) -> Result<()> {
        self.consumer.subscribe(&[&self.topic])?;

        // metadata fetch blocks until the broker answers
        let consumer = self.consumer.clone();
        let topic = self.topic.clone();
        tokio::task::spawn_blocking(move || {
            consumer.fetch_metadata(Some(&topic), METADATA_TIMEOUT)
        })
        .await
        .map_err(|e| EconomyError::Internal(format!("metadata task failed: {}", e)))??;

        self.connected.store(true, Ordering::Relaxed);
        info!("✅ Kafka consumer subscribed to topic: {}", self.topic);
        Ok(())
    }

    async fn next_message(&self) -> Result<TickMessage> {
        let message = self.consumer.recv().await?;
        Ok(TickMessage {
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        })
    }

    async fn commit(&self, message: &TickMessage) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )?;
        self.consumer.commit(&offsets, CommitMode::Async)?;
        debug!(
            "Committed {}[{}] at offset {}",
            message.topic, message.partition, message.offset
        );
        Ok(())
    }

    async fn redeliver(&self, message: &TickMessage) -> Result<()> {
        // seek blocks for up to SEEK_TIMEOUT
        let consumer = self.consumer.clone();
        let (topic, partition, offset) = (message.topic.clone(), message.partition, message.offset);
        tokio::task::spawn_blocking(move || {
            consumer.seek(&topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
        })
        .await
        .map_err(|e| EconomyError::Internal(format!("seek task failed: {}", e)))??;
        debug!(
            "Rewound {}[{}] to offset {}",
            message.topic, message.partition, message.offset
        );
        Ok(())
    }

    async fn close(&self) {
        self.consumer.unsubscribe();
        info!("🔌 Kafka consumer closed");
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// In-process tick queue with Kafka-like offsets
pub struct MemoryTickSource {
    topic: String,
    queue: Mutex<VecDeque<TickMessage>>,
    committed: Mutex<Vec<i64>>,
    notify: Notify,
    next_offset: AtomicI64,
    redeliveries: AtomicU64,
    connected: AtomicBool,
    closed: AtomicBool,
}

impl MemoryTickSource {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            queue: Mutex::new(VecDeque::new()),
            committed: Mutex::new(Vec::new()),
            notify: Notify::new(),
            next_offset: AtomicI64::new(0),
            redeliveries: AtomicU64::new(0),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Append a raw payload, returning its offset
    pub async fn push(&self, payload: impl Into<Vec<u8>>) -> i64 {
        let offset = self.next_offset.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().await.push_back(TickMessage {
            payload: payload.into(),
            topic: self.topic.clone(),
            partition: 0,
            offset,
        });
        self.notify.notify_one();
        offset
    }

    pub async fn push_event(&self, event: &TickEvent) -> Result<i64> {
        let payload = serde_json::to_vec(event)?;
        Ok(self.push(payload).await)
    }

    /// Offsets committed so far, in commit order
    pub async fn committed_offsets(&self) -> Vec<i64> {
        self.committed.lock().await.clone()
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub fn redelivery_count(&self) -> u64 {
        self.redeliveries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TickSource for MemoryTickSource {
    async fn connect(&self) -> Result<()> {
        self.closed.store(false, Ordering::Relaxed);
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn next_message(&self) -> Result<TickMessage> {
        loop {
            if self.closed.load(Ordering::Relaxed) {
                return Err(EconomyError::Broker("tick source is closed".to_string()));
            }
            if let Some(message) = self.queue.lock().await.pop_front() {
                return Ok(message);
            }
            self.notify.notified().await;
        }
    }

    async fn commit(&self, message: &TickMessage) -> Result<()> {
        self.committed.lock().await.push(message.offset);
        Ok(())
    }

    async fn redeliver(&self, message: &TickMessage) -> Result<()> {
        self.redeliveries.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().await.push_front(message.clone());
        self.notify.notify_one();
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
        self.notify.notify_one();
        let pending = self.queue.lock().await.len();
        if pending > 0 {
            warn!("⚠️ Tick source closed with {} undelivered ticks", pending);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
