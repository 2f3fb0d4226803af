//! Broker plumbing: tick intake, the clearing orchestrator and event publishing.

pub mod consumer;
pub mod producer;
pub mod source;

pub use consumer::{ConsumerStatsSnapshot, CycleOutcome, TickConsumer, TickPhase};
pub use producer::{EventPublisher, MarketEventPublisher};
pub use source::{KafkaTickSource, MemoryTickSource, TickMessage, TickSource};
