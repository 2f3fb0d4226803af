//! Tick-driven clearing orchestrator.
//!
//! Consumes world ticks and clears every market once per hourly tick.
//! Delivery is at-least-once: the offset is committed only after
//! clearing succeeds, so a failed or interrupted clearing replays the
//! same tick. Repeated tick ids are not deduplicated here.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::producer::EventPublisher;
use super::source::{TickMessage, TickSource};
use crate::config::KafkaConfig;
use crate::constants::broker;
use crate::error::{EconomyError, Result};
use crate::models::{ClearingSummary, MarketClearedEvent, MarketResult, TickEvent};
use crate::services::market_service::MarketClearer;
use crate::services::metrics;

/// Where the orchestrator is within the current tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPhase {
    Idle,
    Reading,
    Validating,
    Clearing,
    Committing,
}

impl TickPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TickPhase::Reading,
            2 => TickPhase::Validating,
            3 => TickPhase::Clearing,
            4 => TickPhase::Committing,
            _ => TickPhase::Idle,
        }
    }
}

/// How a single read-validate-clear-commit cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing arrived within the read timeout
    NoMessage,
    /// Cleared and committed
    Cleared,
    /// Invalid or unsupported tick, committed without clearing
    Skipped,
    /// Clearing failed; offset withheld and the tick queued again
    Retrying,
    /// The broker read itself failed
    ReadFailed,
    /// Stop was requested while waiting for a tick
    Stopped,
}

#[derive(Debug, Default)]
struct ConsumerStats {
    received: AtomicU64,
    processed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerStatsSnapshot {
    pub received: u64,
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Clone)]
struct CycleRunner {
    source: Arc<dyn TickSource>,
    clearer: Arc<dyn MarketClearer>,
    publisher: Option<Arc<dyn EventPublisher>>,
    read_timeout: Duration,
    phase: Arc<AtomicU8>,
    stats: Arc<ConsumerStats>,
}

impl CycleRunner {
    fn set_phase(&self, phase: TickPhase) {
        self.phase.store(phase as u8, Ordering::Relaxed);
    }

    async fn run_cycle(&self, stop: &mut watch::Receiver<bool>) -> CycleOutcome {
        let outcome = match self.read(stop).await {
            Ok(Some(message)) => self.process(message).await,
            Ok(None) => CycleOutcome::NoMessage,
            Err(outcome) => outcome,
        };
        self.set_phase(TickPhase::Idle);
        outcome
    }

    async fn read(
        &self,
        stop: &mut watch::Receiver<bool>,
    ) -> std::result::Result<Option<TickMessage>, CycleOutcome> {
        self.set_phase(TickPhase::Reading);

        let read = tokio::select! {
            biased;
            _ = stop.changed() => return Err(CycleOutcome::Stopped),
            read = tokio::time::timeout(self.read_timeout, self.source.next_message()) => read,
        };

        match read {
            Err(_) => Ok(None),
            Ok(Ok(message)) => {
                self.stats.received.fetch_add(1, Ordering::Relaxed);
                Ok(Some(message))
            }
            Ok(Err(e)) => {
                error!("❌ Tick read failed: {}", e);
                metrics::track_tick("read_error");
                tokio::time::sleep(Duration::from_millis(broker::READ_ERROR_BACKOFF_MS)).await;
                Err(CycleOutcome::ReadFailed)
            }
        }
    }

    async fn process(&self, message: TickMessage) -> CycleOutcome {
        self.set_phase(TickPhase::Validating);
        let event = match TickEvent::parse(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    "⚠️ Skipping tick at {}[{}]@{}",
                    message.topic, message.partition, message.offset
                );
                e.log();
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                metrics::track_tick("skipped");
                self.commit(&message).await;
                return CycleOutcome::Skipped;
            }
        };

        info!(
            "⏰ Tick received: event {}, tick {}, game hour {:?}",
            event.event_id,
            event.tick_id(),
            event.game_hour()
        );

        self.set_phase(TickPhase::Clearing);
        let start = Instant::now();
        let results = match self.clearer.clear_markets(event.tick_id()).await {
            Ok(results) => results,
            Err(e) => {
                error!("❌ Clearing failed for tick {}, queued for retry", event.tick_id());
                e.log();
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                metrics::track_tick("retry");
                if let Err(e) = self.source.redeliver(&message).await {
                    error!("❌ Could not queue tick {} for retry: {}", event.tick_id(), e);
                }
                return CycleOutcome::Retrying;
            }
        };

        let summary = ClearingSummary::from_results(event.tick_id(), &results);
        info!(
            "📈 Tick {} summary: {} markets, volume {}, avg efficiency {:.1}%, {:?}",
            summary.tick_id,
            summary.markets_processed,
            summary.total_volume,
            summary.average_efficiency * 100.0,
            start.elapsed()
        );

        self.publish(&results, event.tick_id(), event.game_hour()).await;

        self.set_phase(TickPhase::Committing);
        self.commit(&message).await;
        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        metrics::track_tick("cleared");
        CycleOutcome::Cleared
    }

    async fn publish(&self, results: &[MarketResult], tick_id: &str, game_hour: Option<u32>) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        for result in results {
            let event = MarketClearedEvent::from_result(result, tick_id, game_hour);
            if let Err(e) = publisher.publish(&event).await {
                warn!("⚠️ Failed to publish {} result: {}", event.market_id, e);
                metrics::track_publish_failure();
            }
        }
    }

    async fn commit(&self, message: &TickMessage) {
        if let Err(e) = self.source.commit(message).await {
            // uncommitted ticks are replayed after a restart
            error!("❌ Failed to commit offset {}: {}", message.offset, e);
        }
    }
}

pub struct TickConsumer {
    runner: Arc<CycleRunner>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TickConsumer {
    pub fn new(
        source: Arc<dyn TickSource>,
        clearer: Arc<dyn MarketClearer>,
        config: &KafkaConfig,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            runner: Arc::new(CycleRunner {
                source,
                clearer,
                publisher: None,
                read_timeout: config.read_timeout(),
                phase: Arc::new(AtomicU8::new(TickPhase::Idle as u8)),
                stats: Arc::new(ConsumerStats::default()),
            }),
            stop_tx,
            handle: Mutex::new(None),
        }
    }

    /// Publish one event per market after every successful clearing
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        let mut runner = (*self.runner).clone();
        runner.publisher = Some(publisher);
        self.runner = Arc::new(runner);
        self
    }

    /// Connect the source and start the consumer loop on its own task
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            warn!("⚠️ Tick consumer already running");
            return Ok(());
        }

        self.runner.source.connect().await?;
        self.stop_tx.send_replace(false);

        let runner = self.runner.clone();
        let mut stop = self.stop_tx.subscribe();
        *handle = Some(tokio::spawn(async move {
            info!("🚀 Tick consumer started");
            while !*stop.borrow() {
                let outcome = runner.run_cycle(&mut stop).await;
                debug!("Tick cycle finished: {:?}", outcome);
                if outcome == CycleOutcome::Stopped {
                    break;
                }
            }
            info!("⏹️ Tick consumer loop exited");
        }));
        Ok(())
    }

    /// Run a single cycle on the caller's task
    pub async fn run_once(&self) -> CycleOutcome {
        let mut stop = self.stop_tx.subscribe();
        self.runner.run_cycle(&mut stop).await
    }

    /// Signal the loop, wait for the in-flight cycle to finish, then close the source
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("❌ Tick consumer task ended abnormally: {}", e);
            }
        }
        self.runner.source.close().await;
        info!("🛑 Tick consumer stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Unhealthy until the source has connected at least once
    pub fn health_check(&self) -> Result<()> {
        if !self.runner.source.is_connected() {
            return Err(EconomyError::Broker(
                "tick source has never connected".to_string(),
            ));
        }
        Ok(())
    }

    pub fn phase(&self) -> TickPhase {
        TickPhase::from_u8(self.runner.phase.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        let stats = &self.runner.stats;
        ConsumerStatsSnapshot {
            received: stats.received.load(Ordering::Relaxed),
            processed: stats.processed.load(Ordering::Relaxed),
            skipped: stats.skipped.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
        }
    }
}
