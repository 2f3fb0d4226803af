use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use tracing::debug;

use crate::constants::market;
use crate::models::Trade;

/// Clearing prices (one per pass) and timestamped trades of one market
#[derive(Debug, Clone)]
pub struct MarketHistory {
    prices: Vec<f64>,
    trades: VecDeque<Trade>,
    last_volume: u64,
    retention: Duration,
    recorded_since_prune: usize,
}

impl MarketHistory {
    pub fn new(retention_days: i64) -> Self {
        Self {
            prices: Vec::with_capacity(1000),
            trades: VecDeque::with_capacity(1000),
            last_volume: 0,
            retention: Duration::days(retention_days.max(1)),
            recorded_since_prune: 0,
        }
    }

    /// Append one clearing pass; `price` is 0.0 when nothing traded
    pub fn record_clearing(&mut self, price: f64, volume: u64, trades: &[Trade]) {
        self.prices.push(price);
        self.last_volume = volume;

        for trade in trades {
            self.trades.push_back(trade.clone());
            self.recorded_since_prune += 1;
            if self.recorded_since_prune >= market::TRADE_HISTORY_PRUNE_EVERY {
                self.prune(Utc::now());
            }
        }
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn last_price(&self) -> f64 {
        self.prices.last().copied().unwrap_or(0.0)
    }

    pub fn last_volume(&self) -> u64 {
        self.last_volume
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Units traded in the 24 hours before `now`
    pub fn volume_since(&self, now: DateTime<Utc>) -> u64 {
        let cutoff = now - Duration::seconds(market::VOLUME_WINDOW_SECS);
        self.trades
            .iter()
            .rev()
            .take_while(|t| t.executed_at >= cutoff)
            .map(|t| t.quantity as u64)
            .sum()
    }

    /// Drop trades older than the retention window, returning how many went
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        self.recorded_since_prune = 0;
        let cutoff = now - self.retention;
        let before = self.trades.len();
        while self.trades.front().is_some_and(|t| t.executed_at < cutoff) {
            self.trades.pop_front();
        }
        let removed = before - self.trades.len();
        if removed > 0 {
            debug!("🗑️ Pruned {} trade records older than {}", removed, cutoff);
        }
        removed
    }
}
