use serde::{Deserialize, Serialize};

use super::commodity::Commodity;
use super::order::Order;
use crate::constants::market;

/// Read-only view of one market that agents consult before trading
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketState {
    pub commodity: Commodity,
    pub last_price: f64,
    /// Volume matched in the most recent clearing pass
    pub volume: u64,
    pub volatility: f64,
    pub trend: f64,
    pub active_orders: Vec<Order>,
    pub volume_24h: u64,
}

impl MarketState {
    /// State of a market that has never cleared
    pub fn empty(commodity: Commodity) -> Self {
        Self {
            commodity,
            last_price: 0.0,
            volume: 0,
            volatility: 0.0,
            trend: 0.0,
            active_orders: Vec::new(),
            volume_24h: 0,
        }
    }

    /// Derive price statistics from a clearing price history (oldest first)
    pub fn from_history(commodity: Commodity, history: &[f64]) -> Self {
        Self {
            last_price: history.last().copied().unwrap_or(0.0),
            volatility: volatility(history),
            trend: trend(history),
            ..Self::empty(commodity)
        }
    }
}

/// Population variance of the most recent prices; 0 until the window is full
pub fn volatility(history: &[f64]) -> f64 {
    if history.len() < market::VOLATILITY_WINDOW {
        return 0.0;
    }
    let recent = &history[history.len() - market::VOLATILITY_WINDOW..];
    let mean = recent.iter().sum::<f64>() / recent.len() as f64;
    recent.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / recent.len() as f64
}

/// Relative change across the trend window; 0 when the base price is too small
pub fn trend(history: &[f64]) -> f64 {
    if history.len() < market::TREND_WINDOW {
        return 0.0;
    }
    let recent = &history[history.len() - market::TREND_WINDOW..];
    let base = recent[0];
    if base <= market::TREND_MIN_BASE_PRICE {
        return 0.0;
    }
    (recent[market::TREND_WINDOW - 1] - base) / base
}
