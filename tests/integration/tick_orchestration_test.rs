use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_test::{assert_err, assert_ok};

use economy_service::config::{Config, KafkaConfig};
use economy_service::models::{Commodity, MarketClearedEvent, MarketResult, TickEvent};
use economy_service::services::agent::AgentRegistry;
use economy_service::services::kafka::{
    CycleOutcome, EventPublisher, MemoryTickSource, TickConsumer, TickPhase, TickSource,
};
use economy_service::services::{MarketClearer, MarketService};
use economy_service::EconomyError;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn kafka_config() -> KafkaConfig {
    KafkaConfig {
        max_processing_time_ms: 50,
        ..KafkaConfig::default()
    }
}

/// Fails the first `failures` calls, then returns one empty result per commodity
#[derive(Default)]
struct ScriptedClearer {
    failures: usize,
    calls: AtomicUsize,
    ticks: Mutex<Vec<String>>,
}

impl ScriptedClearer {
    fn failing(failures: usize) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketClearer for ScriptedClearer {
    async fn clear_markets(&self, tick_id: &str) -> economy_service::Result<Vec<MarketResult>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.ticks.lock().await.push(tick_id.to_string());
        if call < self.failures {
            return Err(EconomyError::Clearing("downstream unavailable".to_string()));
        }
        Ok(Commodity::ALL.into_iter().map(MarketResult::empty).collect())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<MarketClearedEvent>>,
    fail: bool,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &MarketClearedEvent) -> economy_service::Result<()> {
        if self.fail {
            return Err(EconomyError::Broker("producer down".to_string()));
        }
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

fn tick_payload(tick_type: &str, tick_id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "event_id": "evt-1",
        "event_type": "world.tick",
        "timestamp": "2024-01-01T00:00:00Z",
        "data": {
            "tick_id": tick_id,
            "tick_type": tick_type,
            "game_hour": 7,
            "game_time": "2024-01-01T07:00:00Z",
            "tick_timestamp": "2024-01-01T00:00:00Z",
            "triggered_by": "scheduler"
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_non_hourly_tick_is_committed_without_clearing() -> Result<()> {
    init_logging();
    let source = Arc::new(MemoryTickSource::new("ticks"));
    let clearer = Arc::new(ScriptedClearer::default());
    let consumer = TickConsumer::new(source.clone(), clearer.clone(), &kafka_config());

    source.push(tick_payload("daily", "day-1")).await;
    source.push(tick_payload("hourly", "")).await;

    assert_eq!(consumer.run_once().await, CycleOutcome::Skipped);
    assert_eq!(consumer.run_once().await, CycleOutcome::Skipped);
    assert_eq!(clearer.calls(), 0);
    assert_eq!(source.committed_offsets().await, vec![0, 1]);
    assert_eq!(consumer.stats().skipped, 2);
    println!("✅ Unsupported and invalid ticks skipped");
    Ok(())
}

#[tokio::test]
async fn test_failed_clearing_redelivers_same_tick() -> Result<()> {
    init_logging();
    let source = Arc::new(MemoryTickSource::new("ticks"));
    let clearer = Arc::new(ScriptedClearer::failing(1));
    let consumer = TickConsumer::new(source.clone(), clearer.clone(), &kafka_config());

    source.push(tick_payload("hourly", "hour-7")).await;

    assert_eq!(consumer.run_once().await, CycleOutcome::Retrying);
    assert!(source.committed_offsets().await.is_empty());
    assert_eq!(source.redelivery_count(), 1);

    assert_eq!(consumer.run_once().await, CycleOutcome::Cleared);
    assert_eq!(source.committed_offsets().await, vec![0]);
    assert_eq!(*clearer.ticks.lock().await, vec!["hour-7", "hour-7"]);

    let stats = consumer.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.processed, 1);
    println!("✅ Tick retried after clearing failure");
    Ok(())
}

#[tokio::test]
async fn test_repeated_tick_id_is_cleared_twice() -> Result<()> {
    init_logging();
    let source = Arc::new(MemoryTickSource::new("ticks"));
    let clearer = Arc::new(ScriptedClearer::default());
    let consumer = TickConsumer::new(source.clone(), clearer.clone(), &kafka_config());

    source.push(tick_payload("hourly", "hour-1")).await;
    source.push(tick_payload("hourly", "hour-1")).await;

    assert_eq!(consumer.run_once().await, CycleOutcome::Cleared);
    assert_eq!(consumer.run_once().await, CycleOutcome::Cleared);
    assert_eq!(clearer.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_results_are_published_per_market() -> Result<()> {
    init_logging();
    let source = Arc::new(MemoryTickSource::new("ticks"));
    let publisher = Arc::new(RecordingPublisher::default());
    let consumer = TickConsumer::new(
        source.clone(),
        Arc::new(ScriptedClearer::default()),
        &kafka_config(),
    )
    .with_publisher(publisher.clone());

    source.push(tick_payload("hourly", "hour-9")).await;
    assert_eq!(consumer.run_once().await, CycleOutcome::Cleared);

    let events = publisher.events.lock().await;
    assert_eq!(events.len(), Commodity::ALL.len());
    assert_eq!(events[0].market_id, "market-food");
    assert_eq!(events[0].event_type, "simulation.event.market_cleared");
    assert_eq!(events[0].tick_id.as_deref(), Some("hour-9"));
    assert_eq!(events[0].game_hour, Some(7));
    Ok(())
}

#[tokio::test]
async fn test_publish_failure_does_not_block_commit() -> Result<()> {
    init_logging();
    let source = Arc::new(MemoryTickSource::new("ticks"));
    let publisher = Arc::new(RecordingPublisher {
        fail: true,
        ..RecordingPublisher::default()
    });
    let consumer = TickConsumer::new(
        source.clone(),
        Arc::new(ScriptedClearer::default()),
        &kafka_config(),
    )
    .with_publisher(publisher);

    source.push(tick_payload("hourly", "hour-2")).await;
    assert_eq!(consumer.run_once().await, CycleOutcome::Cleared);
    assert_eq!(source.committed_offsets().await, vec![0]);
    Ok(())
}

#[tokio::test]
async fn test_health_check_before_and_after_start() -> Result<()> {
    init_logging();
    let source = Arc::new(MemoryTickSource::new("ticks"));
    let consumer = TickConsumer::new(
        source.clone(),
        Arc::new(ScriptedClearer::default()),
        &kafka_config(),
    );

    assert_err!(consumer.health_check());
    consumer.start().await?;
    assert_ok!(consumer.health_check());
    assert!(consumer.is_running().await);

    consumer.stop().await;
    assert!(!consumer.is_running().await);
    // closed source refuses further reads
    assert_err!(source.next_message().await);
    Ok(())
}

#[tokio::test]
async fn test_running_loop_clears_real_markets() -> Result<()> {
    init_logging();
    let mut config = Config::default();
    config.agents.default_population = false;
    let service = Arc::new(MarketService::new(&config, AgentRegistry::new()));
    let source = Arc::new(MemoryTickSource::new("ticks"));
    let consumer = TickConsumer::new(source.clone(), service.clone(), &kafka_config());

    consumer.start().await?;
    source.push_event(&TickEvent::hourly("hour-0", Some(0))).await?;
    source.push_event(&TickEvent::hourly("hour-1", Some(1))).await?;

    let mut waited = Duration::ZERO;
    while consumer.stats().processed < 2 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }

    consumer.stop().await;
    assert_eq!(consumer.stats().processed, 2);
    assert_eq!(consumer.phase(), TickPhase::Idle);
    assert_eq!(source.committed_offsets().await, vec![0, 1]);
    assert_eq!(service.price_history(Commodity::Food).await?.len(), 2);
    assert_eq!(service.metrics_snapshot().successful_clearings, 2);

    service.shutdown().await;
    println!("✅ Consumer loop cleared two ticks and stopped cleanly");
    Ok(())
}
