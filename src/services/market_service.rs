//! Market service: owns every commodity market and clears them per tick.
//!
//! Each market lives on its own task and is reached only through a bounded
//! command queue, so a book is never mutated from two places at once.
//! Matching runs in parallel under a worker pool; settlement then runs on
//! the caller's task in commodity order, so an agent trading several
//! commodities in one tick is never written concurrently. A clearing pass
//! is never cancelled: every market that matched is settled.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::error::{EconomyError, Result};
use crate::models::{ClearingSummary, Commodity, MarketResult, MarketState, Order};
use crate::services::agent::AgentRegistry;
use crate::services::market_clearing::{Market, MatchOutcome, settle};
use crate::services::metrics;

/// Boundary the tick consumer clears markets through
#[async_trait]
pub trait MarketClearer: Send + Sync {
    /// Clear every managed market once, returning one result per market
    async fn clear_markets(&self, tick_id: &str) -> Result<Vec<MarketResult>>;
}

/// Commands accepted by a market owner task
#[derive(Debug)]
pub enum MarketCommand {
    AddOrder {
        order: Order,
        reply: oneshot::Sender<Result<()>>,
    },
    Match {
        reply: oneshot::Sender<MatchOutcome>,
    },
    State {
        reply: oneshot::Sender<MarketState>,
    },
    History {
        reply: oneshot::Sender<Vec<f64>>,
    },
    Shutdown,
}

#[derive(Debug, Default)]
pub struct ServiceMetrics {
    total_requests: AtomicU64,
    successful_clearings: AtomicU64,
    failed_clearings: AtomicU64,
    /// Moving average of clearing time in microseconds
    avg_processing_us: AtomicU64,
    active_markets: AtomicUsize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceMetricsSnapshot {
    pub total_requests: u64,
    pub successful_clearings: u64,
    pub failed_clearings: u64,
    pub average_processing_ms: f64,
    pub active_markets: usize,
}

impl ServiceMetrics {
    fn record_processing_time(&self, elapsed: Duration) {
        let new = elapsed.as_micros() as u64;
        let old = self.avg_processing_us.load(Ordering::Relaxed);
        let avg = if old == 0 { new } else { (new + 9 * old) / 10 };
        self.avg_processing_us.store(avg, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServiceMetricsSnapshot {
        ServiceMetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_clearings: self.successful_clearings.load(Ordering::Relaxed),
            failed_clearings: self.failed_clearings.load(Ordering::Relaxed),
            average_processing_ms: self.avg_processing_us.load(Ordering::Relaxed) as f64 / 1000.0,
            active_markets: self.active_markets.load(Ordering::Relaxed),
        }
    }
}

pub struct MarketService {
    markets: BTreeMap<Commodity, mpsc::Sender<MarketCommand>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    agents: Arc<Mutex<AgentRegistry>>,
    rng: Mutex<StdRng>,
    last_results: DashMap<Commodity, MarketResult>,
    auto_trade: bool,
    clearing_budget: Duration,
    metrics: Arc<ServiceMetrics>,
}

impl MarketService {
    /// Spawn one owner task per commodity. Must be called inside a Tokio runtime.
    pub fn new(config: &Config, agents: AgentRegistry) -> Self {
        let pool = Arc::new(Semaphore::new(config.clearing.worker_pool_size.max(1)));
        let metrics = Arc::new(ServiceMetrics::default());
        let mut markets = BTreeMap::new();
        let mut tasks = Vec::with_capacity(Commodity::ALL.len());

        for commodity in Commodity::ALL {
            let (tx, rx) = mpsc::channel(config.clearing.queue_depth.max(1));
            let market = Market::with_retention(commodity, config.clearing.trade_retention_days);
            tasks.push(tokio::spawn(run_market(
                market,
                rx,
                pool.clone(),
                metrics.clone(),
            )));
            markets.insert(commodity, tx);
        }
        metrics.active_markets.store(markets.len(), Ordering::Relaxed);

        let rng = match config.agents.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            "🏪 Market service started: {} markets, {} agents, pool size {}",
            markets.len(),
            agents.len(),
            config.clearing.worker_pool_size
        );

        Self {
            markets,
            tasks: Mutex::new(tasks),
            agents: Arc::new(Mutex::new(agents)),
            rng: Mutex::new(rng),
            last_results: DashMap::new(),
            auto_trade: config.agents.default_population,
            clearing_budget: config.clearing.budget(),
            metrics,
        }
    }

    fn sender(&self, commodity: Commodity) -> Result<&mpsc::Sender<MarketCommand>> {
        self.markets
            .get(&commodity)
            .ok_or(EconomyError::MarketUnavailable(commodity))
    }

    async fn request<T>(
        &self,
        commodity: Commodity,
        command: impl FnOnce(oneshot::Sender<T>) -> MarketCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.sender(commodity)?
            .send(command(reply))
            .await
            .map_err(|_| EconomyError::MarketUnavailable(commodity))?;
        rx.await.map_err(|_| EconomyError::MarketUnavailable(commodity))
    }

    /// Queue an order for its commodity's next clearing pass
    pub async fn submit_order(&self, order: Order) -> Result<()> {
        let commodity = order.commodity;
        self.request(commodity, |reply| MarketCommand::AddOrder { order, reply })
            .await?
    }

    pub async fn market_state(&self, commodity: Commodity) -> Result<MarketState> {
        self.request(commodity, |reply| MarketCommand::State { reply })
            .await
    }

    pub async fn price_history(&self, commodity: Commodity) -> Result<Vec<f64>> {
        self.request(commodity, |reply| MarketCommand::History { reply })
            .await
    }

    /// Result of the most recent completed clearing of `commodity`
    pub fn last_result(&self, commodity: Commodity) -> Option<MarketResult> {
        self.last_results.get(&commodity).map(|r| r.value().clone())
    }

    pub fn agents(&self) -> Arc<Mutex<AgentRegistry>> {
        self.agents.clone()
    }

    /// Let every agent decide one trade per commodity and submit it.
    ///
    /// Agents holding inventory act as sellers, the rest as buyers.
    /// Returns the number of orders accepted.
    pub async fn run_agent_round(&self) -> Result<usize> {
        let mut states = Vec::with_capacity(Commodity::ALL.len());
        for commodity in Commodity::ALL {
            states.push((commodity, self.market_state(commodity).await?));
        }

        let mut orders = Vec::new();
        {
            let agents = self.agents.lock().await;
            let mut rng = self.rng.lock().await;
            for (commodity, state) in &states {
                let commodity = *commodity;
                for agent in agents.iter() {
                    let is_producer = agent.inventory(commodity) > 0;
                    if let Some(order) =
                        agent.decide_trade(commodity, state, is_producer, &mut *rng)
                    {
                        orders.push(order);
                    }
                }
            }
        }

        let mut accepted = 0;
        for order in orders {
            let agent_id = order.agent_id.clone();
            match self.submit_order(order).await {
                Ok(()) => accepted += 1,
                Err(e) => warn!("⚠️ Order from agent {} rejected: {}", agent_id, e),
            }
        }
        debug!("🤖 Agent round submitted {} orders", accepted);
        Ok(accepted)
    }

    /// Ask every market to match and wait for all of them, in commodity order.
    ///
    /// A market whose task is gone yields an error in its slot; the others
    /// still report their outcome.
    async fn match_all(&self) -> Vec<Result<MatchOutcome>> {
        let mut pending = Vec::with_capacity(self.markets.len());
        for (&commodity, sender) in &self.markets {
            let (reply, rx) = oneshot::channel();
            // a failed send drops `reply`, so `rx` resolves to an error below
            let _ = sender.send(MarketCommand::Match { reply }).await;
            pending.push(async move {
                rx.await.map_err(|_| EconomyError::MarketUnavailable(commodity))
            });
        }
        join_all(pending).await
    }

    /// Stop every market task and wait for it to exit
    pub async fn shutdown(&self) {
        for sender in self.markets.values() {
            let _ = sender.send(MarketCommand::Shutdown).await;
        }
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                error!("❌ Market task ended abnormally: {}", e);
            }
        }
        info!("🛑 Market service stopped");
    }

    pub fn metrics_snapshot(&self) -> ServiceMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl MarketClearer for MarketService {
    #[instrument(skip(self))]
    async fn clear_markets(&self, tick_id: &str) -> Result<Vec<MarketResult>> {
        let start = Instant::now();
        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);
        info!("🔄 Clearing markets for tick {}", tick_id);

        if self.auto_trade {
            if let Err(e) = self.run_agent_round().await {
                warn!("⚠️ Agent round incomplete for tick {}: {}", tick_id, e);
            }
        }

        let replies = self.match_all().await;
        let elapsed = start.elapsed();
        if elapsed > self.clearing_budget {
            warn!(
                "⏱️ Tick {} matched in {}ms, over the {}ms budget",
                tick_id,
                elapsed.as_millis(),
                self.clearing_budget.as_millis()
            );
            metrics::track_clearing_over_budget(elapsed);
        }

        let mut results = Vec::with_capacity(replies.len());
        let mut failure = None;
        {
            let mut agents = self.agents.lock().await;
            for reply in replies {
                let outcome = match reply {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("❌ Market did not clear for tick {}: {}", tick_id, e);
                        failure.get_or_insert(e);
                        continue;
                    }
                };
                let report = settle(&mut agents, &outcome);
                if !report.missing_agents.is_empty() {
                    warn!(
                        "⚠️ {} settlement skipped for {} unknown agents",
                        outcome.commodity,
                        report.missing_agents.len()
                    );
                }
                if !report.unfunded_trades.is_empty() {
                    warn!(
                        "⚠️ {} dropped {} trades the buyer could not pay for",
                        outcome.commodity,
                        report.unfunded_trades.len()
                    );
                }
                info!(
                    "📊 {}: {} trades, volume {}, price {:.2}, efficiency {:.1}%",
                    outcome.commodity,
                    outcome.trades.len(),
                    outcome.total_volume,
                    outcome.clearing_price,
                    outcome.efficiency * 100.0
                );
                let result = outcome.to_result();
                self.last_results.insert(outcome.commodity, result.clone());
                results.push(result);
            }
        }

        if let Some(e) = failure {
            self.metrics.failed_clearings.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        let summary = ClearingSummary::from_results(tick_id, &results);
        info!(
            "✅ Tick {} cleared: {} markets, {} trades, volume {}, avg efficiency {:.1}%",
            summary.tick_id,
            summary.markets_processed,
            summary.total_trades,
            summary.total_volume,
            summary.average_efficiency * 100.0
        );

        self.metrics.successful_clearings.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_processing_time(start.elapsed());
        Ok(results)
    }
}

async fn run_market(
    mut market: Market,
    mut commands: mpsc::Receiver<MarketCommand>,
    pool: Arc<Semaphore>,
    stats: Arc<ServiceMetrics>,
) {
    let commodity = market.commodity();
    debug!("Market task for {} started", commodity);

    while let Some(command) = commands.recv().await {
        match command {
            MarketCommand::AddOrder { order, reply } => {
                let _ = reply.send(market.add_order(order));
            }
            MarketCommand::Match { reply } => {
                let _permit = pool.acquire().await.ok();
                let outcome = market.match_book();
                if reply.send(outcome).is_err() {
                    warn!("⚠️ {} matched but nobody was waiting for the outcome", commodity);
                    metrics::track_clearing_failure(commodity, "abandoned");
                }
            }
            MarketCommand::State { reply } => {
                let _ = reply.send(market.state());
            }
            MarketCommand::History { reply } => {
                let _ = reply.send(market.history().to_vec());
            }
            MarketCommand::Shutdown => break,
        }
    }

    stats.active_markets.fetch_sub(1, Ordering::Relaxed);
    debug!("Market task for {} stopped", commodity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::agent::TradingAgent;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.agents.default_population = false;
        config.agents.rng_seed = Some(7);
        config
    }

    #[tokio::test]
    async fn test_submit_and_clear() {
        let service = MarketService::new(&quiet_config(), AgentRegistry::new());
        service
            .submit_order(Order::bid("b", Commodity::Wood, 15.0, 10))
            .await
            .unwrap();
        service
            .submit_order(Order::ask("s", Commodity::Wood, 10.0, 5))
            .await
            .unwrap();

        let results = service.clear_markets("tick-1").await.unwrap();
        assert_eq!(results.len(), Commodity::ALL.len());
        let wood = results.iter().find(|r| r.commodity == Commodity::Wood).unwrap();
        assert_eq!(wood.total_volume, 5);
        assert_eq!(wood.clearing_price(), 12.5);

        let snapshot = service.metrics_snapshot();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.successful_clearings, 1);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_order_rejected() {
        let service = MarketService::new(&quiet_config(), AgentRegistry::new());
        let err = service
            .submit_order(Order::bid("b", Commodity::Food, 10.0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EconomyError::InvalidOrder(_)));
        assert!(service.market_state(Commodity::Food).await.unwrap().active_orders.is_empty());
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_settlement_updates_agents() {
        let mut agents = AgentRegistry::new();
        agents.insert(TradingAgent::new("b", 100.0));
        agents.insert(TradingAgent::new("s", 0.0).with_inventory(Commodity::Metal, 4));
        let service = MarketService::new(&quiet_config(), agents);

        service
            .submit_order(Order::bid("b", Commodity::Metal, 10.0, 4))
            .await
            .unwrap();
        service
            .submit_order(Order::ask("s", Commodity::Metal, 10.0, 4))
            .await
            .unwrap();
        service.clear_markets("tick-1").await.unwrap();

        let registry = service.agents();
        let registry = registry.lock().await;
        assert_eq!(registry.get("b").unwrap().wealth(), 60.0);
        assert_eq!(registry.get("s").unwrap().wealth(), 40.0);
        assert_eq!(registry.get("b").unwrap().inventory(Commodity::Metal), 4);
    }

    #[tokio::test]
    async fn test_history_grows_once_per_clear() {
        let service = MarketService::new(&quiet_config(), AgentRegistry::new());
        service.clear_markets("t1").await.unwrap();
        service.clear_markets("t2").await.unwrap();
        assert_eq!(
            service.price_history(Commodity::Crystal).await.unwrap(),
            vec![0.0, 0.0]
        );
        assert!(service.last_result(Commodity::Crystal).is_some());
    }

    #[tokio::test]
    async fn test_closed_market_is_unavailable() {
        let service = MarketService::new(&quiet_config(), AgentRegistry::new());
        service.shutdown().await;
        let err = service.market_state(Commodity::Food).await.unwrap_err();
        assert!(matches!(err, EconomyError::MarketUnavailable(Commodity::Food)));
        assert!(service.clear_markets("t").await.is_err());
        assert_eq!(service.metrics_snapshot().failed_clearings, 1);
    }

    #[tokio::test]
    async fn test_clearing_over_budget_still_settles() {
        let mut config = quiet_config();
        config.clearing.timeout_ms = 1;
        config.clearing.worker_pool_size = 1;
        let mut agents = AgentRegistry::new();
        agents.insert(TradingAgent::new("b", 1_000_000.0));
        agents.insert(
            TradingAgent::new("s", 0.0)
                .with_inventory(Commodity::Food, 5_000)
                .with_inventory(Commodity::Wood, 5_000),
        );
        let service = MarketService::new(&config, agents);

        for commodity in [Commodity::Food, Commodity::Wood] {
            for _ in 0..5_000 {
                service.submit_order(Order::bid("b", commodity, 10.0, 1)).await.unwrap();
                service.submit_order(Order::ask("s", commodity, 9.0, 1)).await.unwrap();
            }
        }

        let results = service.clear_markets("tick-slow").await.unwrap();
        let volume: u64 = results.iter().map(|r| r.total_volume).sum();
        assert_eq!(volume, 10_000);

        for commodity in [Commodity::Food, Commodity::Wood] {
            assert_eq!(service.price_history(commodity).await.unwrap(), vec![9.5]);
            assert_eq!(service.market_state(commodity).await.unwrap().volume_24h, 5_000);
        }

        {
            let registry = service.agents();
            let registry = registry.lock().await;
            assert_eq!(registry.get("b").unwrap().wealth(), 1_000_000.0 - 95_000.0);
            assert_eq!(registry.get("s").unwrap().wealth(), 95_000.0);
            assert_eq!(registry.get("b").unwrap().inventory(Commodity::Food), 5_000);
            assert_eq!(registry.get("s").unwrap().inventory(Commodity::Wood), 0);
        }
        assert_eq!(service.metrics_snapshot().successful_clearings, 1);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_agent_round_with_default_population() {
        let config = quiet_config();
        let agents =
            AgentRegistry::with_default_population(&[Commodity::Food], config.agents.tuning())
                .unwrap();
        let service = MarketService::new(&config, agents);

        let submitted = service.run_agent_round().await.unwrap();
        assert!(submitted > 0);
        let state = service.market_state(Commodity::Food).await.unwrap();
        assert_eq!(state.active_orders.len(), submitted);
        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_agent_rounds_both_complete() {
        let config = quiet_config();
        let agents =
            AgentRegistry::with_default_population(&[Commodity::Food], config.agents.tuning())
                .unwrap();
        let service = MarketService::new(&config, agents);

        let (first, second) = tokio::join!(service.run_agent_round(), service.run_agent_round());
        let submitted = first.unwrap() + second.unwrap();

        let state = service.market_state(Commodity::Food).await.unwrap();
        assert_eq!(state.active_orders.len(), submitted);
        service.shutdown().await;
    }
}
