//! Local multi-round simulation of a single food market.
//!
//! Runs the default population against one market without a broker, which
//! is handy for watching beliefs converge.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::error::Result;
use crate::models::Commodity;
use crate::services::agent::AgentRegistry;
use crate::services::market_clearing::Market;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundSummary {
    pub round: usize,
    pub orders: usize,
    pub trades: usize,
    pub price: f64,
    pub volume: u64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SimulationReport {
    pub rounds: Vec<RoundSummary>,
}

impl SimulationReport {
    /// Price of the first round that traded, if any
    pub fn first_traded_price(&self) -> Option<f64> {
        self.rounds.iter().find(|r| r.trades > 0).map(|r| r.price)
    }

    /// Price of the last round that traded, if any
    pub fn last_traded_price(&self) -> Option<f64> {
        self.rounds.iter().rev().find(|r| r.trades > 0).map(|r| r.price)
    }

    pub fn total_volume(&self) -> u64 {
        self.rounds.iter().map(|r| r.volume).sum()
    }
}

pub struct Simulation {
    commodity: Commodity,
    market: Market,
    agents: AgentRegistry,
    rng: StdRng,
}

impl Simulation {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let commodity = Commodity::Food;
        let agents = AgentRegistry::with_default_population(&[commodity], config.tuning())?;
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            commodity,
            market: Market::new(commodity),
            agents,
            rng,
        })
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    /// One round: every agent decides, the market clears and settles
    pub fn run_round(&mut self, round: usize) -> RoundSummary {
        let state = self.market.state();
        let orders: Vec<_> = self
            .agents
            .iter()
            .filter_map(|agent| {
                let is_producer = agent.inventory(self.commodity) > 0;
                agent.decide_trade(self.commodity, &state, is_producer, &mut self.rng)
            })
            .collect();

        let mut accepted = 0;
        for order in orders {
            match self.market.add_order(order) {
                Ok(()) => accepted += 1,
                Err(e) => warn!("⚠️ Round {} order rejected: {}", round, e),
            }
        }

        let result = self.market.clear(&mut self.agents);
        let summary = RoundSummary {
            round,
            orders: accepted,
            trades: result.cleared_trades.len(),
            price: result.clearing_price(),
            volume: result.total_volume,
            efficiency: result.market_efficiency,
        };

        info!(
            "🔁 Round {}: {} orders, {} trades, price {:.2}, volume {}, efficiency {:.1}%",
            summary.round,
            summary.orders,
            summary.trades,
            summary.price,
            summary.volume,
            summary.efficiency * 100.0
        );
        summary
    }

    pub fn run(&mut self, rounds: usize) -> SimulationReport {
        info!(
            "🎲 Simulating {} rounds of the {} market with {} agents",
            rounds,
            self.commodity,
            self.agents.len()
        );

        let report = SimulationReport {
            rounds: (1..=rounds).map(|round| self.run_round(round)).collect(),
        };

        match (report.first_traded_price(), report.last_traded_price()) {
            (Some(first), Some(last)) => info!(
                "🏁 Simulation done: price {:.2} -> {:.2}, total volume {}",
                first,
                last,
                report.total_volume()
            ),
            _ => info!("🏁 Simulation done: no trades in {} rounds", rounds),
        }
        report
    }
}
