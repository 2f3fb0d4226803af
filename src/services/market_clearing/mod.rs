//! Market clearing engine.
//!
//! One [`Market`] per commodity: a batch [`OrderBook`] that collects orders
//! during a cycle and a double auction that clears it once per tick.

pub mod history;
pub mod matching;
pub mod order_book;
pub mod settlement;

use chrono::Utc;
use std::time::Instant;
use tracing::info;

use crate::constants::market;
use crate::error::Result;
use crate::models::{Commodity, MarketResult, MarketState, Order};
use crate::services::agent::AgentRegistry;
use crate::services::metrics;

pub use history::MarketHistory;
pub use matching::{ClearingPoint, MatchOutcome, calculate_clearing_point, double_auction};
pub use order_book::OrderBook;
pub use settlement::{SettlementReport, settle};

#[derive(Debug, Clone)]
pub struct Market {
    commodity: Commodity,
    book: OrderBook,
    history: MarketHistory,
}

impl Market {
    pub fn new(commodity: Commodity) -> Self {
        Self::with_retention(commodity, market::TRADE_RETENTION_DAYS)
    }

    pub fn with_retention(commodity: Commodity, retention_days: i64) -> Self {
        Self {
            commodity,
            book: OrderBook::new(commodity),
            history: MarketHistory::new(retention_days),
        }
    }

    pub fn commodity(&self) -> Commodity {
        self.commodity
    }

    /// Queue an order for the next clearing pass.
    ///
    /// Orders with zero quantity, a negative or non-finite price, or the
    /// wrong commodity are rejected and never reach the book.
    pub fn add_order(&mut self, order: Order) -> Result<()> {
        if let Err(e) = self.book.add_order(order) {
            metrics::track_order_rejected(self.commodity);
            return Err(e);
        }
        Ok(())
    }

    /// Match the current book and record the pass, without touching agents.
    ///
    /// Appends exactly one entry to the price history and empties the book.
    pub fn match_book(&mut self) -> MatchOutcome {
        let start = Instant::now();
        let (bids, asks) = self.book.take();
        let outcome = double_auction(self.commodity, bids, asks);

        self.history
            .record_clearing(outcome.clearing_price, outcome.total_volume, &outcome.trades);

        metrics::track_market_clearing(
            self.commodity,
            outcome.trades.len(),
            outcome.total_volume,
            outcome.efficiency,
            start.elapsed(),
        );

        info!(
            "🏆 MATCHING COMPLETE [{}]: {} trades, volume {}, price {:.2}, efficiency {:.1}%",
            self.commodity,
            outcome.trades.len(),
            outcome.total_volume,
            outcome.clearing_price,
            outcome.efficiency * 100.0
        );

        outcome
    }

    /// Full clearing pass: match the book, then settle trades onto `agents`
    pub fn clear(&mut self, agents: &mut AgentRegistry) -> MarketResult {
        let outcome = self.match_book();
        settle(agents, &outcome);
        outcome.to_result()
    }

    /// Snapshot consulted by agents before they trade
    pub fn state(&self) -> MarketState {
        MarketState {
            volume: self.history.last_volume(),
            active_orders: self.book.snapshot(),
            volume_24h: self.history.volume_since(Utc::now()),
            ..MarketState::from_history(self.commodity, self.history.prices())
        }
    }

    pub fn history(&self) -> &[f64] {
        self.history.prices()
    }

    pub fn last_price(&self) -> f64 {
        self.history.last_price()
    }

    /// Active orders waiting for the next pass
    pub fn order_book(&self) -> Vec<Order> {
        self.book.snapshot()
    }
}
