use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::commodity::Commodity;
use crate::constants::broker;

/// Executed match between one bid and one ask
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub id: Uuid,
    pub commodity: Commodity,
    pub buyer_id: String,
    pub seller_id: String,
    pub price: f64,
    pub quantity: u32,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    pub fn value(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

/// Outcome of one clearing pass of one market
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketResult {
    pub commodity: Commodity,
    pub cleared_trades: Vec<Trade>,
    pub new_prices: BTreeMap<Commodity, f64>,
    pub total_volume: u64,
    /// Matched volume over ideally crossable volume, in [0, 1]
    pub market_efficiency: f64,
    pub volume_weighted_price: f64,
}

impl MarketResult {
    pub fn empty(commodity: Commodity) -> Self {
        let mut new_prices = BTreeMap::new();
        new_prices.insert(commodity, 0.0);
        Self {
            commodity,
            cleared_trades: Vec::new(),
            new_prices,
            total_volume: 0,
            market_efficiency: 0.0,
            volume_weighted_price: 0.0,
        }
    }

    /// Price recorded for this market's commodity (0.0 when nothing traded)
    pub fn clearing_price(&self) -> f64 {
        self.new_prices.get(&self.commodity).copied().unwrap_or(0.0)
    }
}

/// Aggregate of a tick's clearing across markets, for reporting only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClearingSummary {
    pub tick_id: String,
    pub markets_processed: usize,
    pub total_trades: usize,
    pub total_volume: u64,
    pub average_efficiency: f64,
}

impl ClearingSummary {
    pub fn from_results(tick_id: &str, results: &[MarketResult]) -> Self {
        let average_efficiency = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.market_efficiency).sum::<f64>() / results.len() as f64
        };

        Self {
            tick_id: tick_id.to_string(),
            markets_processed: results.len(),
            total_trades: results.iter().map(|r| r.cleared_trades.len()).sum(),
            total_volume: results.iter().map(|r| r.total_volume).sum(),
            average_efficiency,
        }
    }
}

/// Event published to the simulation event topic after a tick clears
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketClearedEvent {
    pub event_type: String,
    pub commodity: Commodity,
    pub price: f64,
    pub volume: u64,
    pub efficiency: f64,
    pub trades: usize,
    pub timestamp: DateTime<Utc>,
    pub market_id: String,
    pub period: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_hour: Option<u32>,
}

impl MarketClearedEvent {
    pub fn from_result(result: &MarketResult, tick_id: &str, game_hour: Option<u32>) -> Self {
        Self {
            event_type: broker::MARKET_CLEARED_EVENT.to_string(),
            commodity: result.commodity,
            price: result.clearing_price(),
            volume: result.total_volume,
            efficiency: result.market_efficiency,
            trades: result.cleared_trades.len(),
            timestamp: Utc::now(),
            market_id: result.commodity.market_id(),
            period: broker::SUPPORTED_TICK_TYPE.to_string(),
            tick_id: (!tick_id.is_empty()).then(|| tick_id.to_string()),
            game_hour,
        }
    }
}
