use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{Commodity, MarketResult, Order, Trade};

/// Intersection of the cumulative demand and supply curves
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClearingPoint {
    pub price: f64,
    /// Largest volume that can cross at any price
    pub volume: u64,
    pub bid_levels: usize,
    pub ask_levels: usize,
}

/// Everything one double-auction pass produced, before settlement
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub commodity: Commodity,
    pub trades: Vec<Trade>,
    /// Midpoint of the last match, 0.0 when nothing traded
    pub clearing_price: f64,
    pub total_volume: u64,
    pub ideal_volume: u64,
    pub efficiency: f64,
    pub volume_weighted_price: f64,
    /// Orders that took part in the pass, in submission order per side
    pub bids: Vec<Order>,
    pub asks: Vec<Order>,
}

impl MatchOutcome {
    pub fn empty(commodity: Commodity, bids: Vec<Order>, asks: Vec<Order>) -> Self {
        Self {
            commodity,
            trades: Vec::new(),
            clearing_price: 0.0,
            total_volume: 0,
            ideal_volume: 0,
            efficiency: 0.0,
            volume_weighted_price: 0.0,
            bids,
            asks,
        }
    }

    pub fn to_result(&self) -> MarketResult {
        let mut new_prices = BTreeMap::new();
        new_prices.insert(self.commodity, self.clearing_price);

        MarketResult {
            commodity: self.commodity,
            cleared_trades: self.trades.clone(),
            new_prices,
            total_volume: self.total_volume,
            market_efficiency: self.efficiency,
            volume_weighted_price: self.volume_weighted_price,
        }
    }
}

/// Run the double auction over one book.
///
/// Bids are walked from the highest price, asks from the lowest; equal
/// prices keep submission order. Each crossing pair trades
/// `min(remaining bid, remaining ask)` at the midpoint of the two prices.
/// Leftover quantity is dropped with the book.
pub fn double_auction(commodity: Commodity, bids: Vec<Order>, asks: Vec<Order>) -> MatchOutcome {
    if bids.is_empty() || asks.is_empty() {
        return MatchOutcome::empty(commodity, bids, asks);
    }

    let mut bid_queue: Vec<&Order> = bids.iter().collect();
    let mut ask_queue: Vec<&Order> = asks.iter().collect();
    // stable sorts keep first-submitted ahead on ties
    bid_queue.sort_by(|a, b| b.price.total_cmp(&a.price));
    ask_queue.sort_by(|a, b| a.price.total_cmp(&b.price));

    let ideal_volume = crossable_volume(&bid_queue, &ask_queue);

    let mut trades = Vec::with_capacity(bid_queue.len().min(ask_queue.len()));
    let mut bid_idx = 0;
    let mut ask_idx = 0;
    let mut bid_remaining = bid_queue[0].quantity;
    let mut ask_remaining = ask_queue[0].quantity;
    let mut clearing_price = 0.0;
    let mut total_volume: u64 = 0;
    let mut notional = 0.0;

    while bid_idx < bid_queue.len() && ask_idx < ask_queue.len() {
        let bid = bid_queue[bid_idx];
        let ask = ask_queue[ask_idx];

        if bid.price < ask.price {
            break;
        }

        let quantity = bid_remaining.min(ask_remaining);
        let price = (bid.price + ask.price) / 2.0;

        trades.push(Trade {
            id: Uuid::new_v4(),
            commodity,
            buyer_id: bid.agent_id.clone(),
            seller_id: ask.agent_id.clone(),
            price,
            quantity,
            executed_at: Utc::now(),
        });

        clearing_price = price;
        total_volume += quantity as u64;
        notional += price * quantity as f64;

        bid_remaining -= quantity;
        ask_remaining -= quantity;

        if bid_remaining == 0 {
            bid_idx += 1;
            if let Some(next) = bid_queue.get(bid_idx) {
                bid_remaining = next.quantity;
            }
        }
        if ask_remaining == 0 {
            ask_idx += 1;
            if let Some(next) = ask_queue.get(ask_idx) {
                ask_remaining = next.quantity;
            }
        }
    }

    let volume_weighted_price = if total_volume > 0 {
        notional / total_volume as f64
    } else {
        0.0
    };

    MatchOutcome {
        commodity,
        trades,
        clearing_price,
        total_volume,
        ideal_volume,
        efficiency: efficiency(total_volume, ideal_volume),
        volume_weighted_price,
        bids,
        asks,
    }
}

/// Matched over ideal volume, clamped to [0, 1]; 0 when nothing could cross
pub fn efficiency(matched: u64, ideal: u64) -> f64 {
    if ideal == 0 {
        return 0.0;
    }
    (matched as f64 / ideal as f64).clamp(0.0, 1.0)
}

fn crossable_volume(bids: &[&Order], asks: &[&Order]) -> u64 {
    let bid_depth = levels(bids);
    let ask_depth = levels(asks);
    calculate_clearing_point(&bid_depth, &ask_depth)
        .map(|point| point.volume)
        .unwrap_or(0)
}

// expects orders already sorted by priority
fn levels(orders: &[&Order]) -> Vec<(f64, u64)> {
    let mut merged: Vec<(f64, u64)> = Vec::new();
    for order in orders {
        match merged.last_mut() {
            Some((price, quantity)) if *price == order.price => *quantity += order.quantity as u64,
            _ => merged.push((order.price, order.quantity as u64)),
        }
    }
    merged
}

/// Calculate the clearing point from supply and demand curves.
///
/// `buy_depth` must be ordered by descending price and `sell_depth` by
/// ascending price, one entry per price level.
pub fn calculate_clearing_point(
    buy_depth: &[(f64, u64)],
    sell_depth: &[(f64, u64)],
) -> Option<ClearingPoint> {
    if buy_depth.is_empty() || sell_depth.is_empty() {
        return None;
    }

    // Build cumulative supply and demand curves
    let mut demand_curve: Vec<(f64, u64)> = Vec::with_capacity(buy_depth.len());
    let mut cumulative_demand = 0;
    for &(price, volume) in buy_depth {
        cumulative_demand += volume;
        demand_curve.push((price, cumulative_demand));
    }

    let mut supply_curve: Vec<(f64, u64)> = Vec::with_capacity(sell_depth.len());
    let mut cumulative_supply = 0;
    for &(price, volume) in sell_depth {
        cumulative_supply += volume;
        supply_curve.push((price, cumulative_supply));
    }

    let mut best: Option<ClearingPoint> = None;
    let mut max_volume = 0;

    for &(demand_price, demand_volume) in &demand_curve {
        for &(supply_price, supply_volume) in &supply_curve {
            // Can only clear if buyers willing to pay >= sellers asking
            if demand_price >= supply_price {
                let clearable = demand_volume.min(supply_volume);
                if clearable > max_volume {
                    max_volume = clearable;
                    best = Some(ClearingPoint {
                        price: (demand_price + supply_price) / 2.0,
                        volume: clearable,
                        bid_levels: demand_curve.len(),
                        ask_levels: supply_curve.len(),
                    });
                }
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: Commodity = Commodity::Food;

    #[test]
    fn test_partial_fill_single_pair() {
        let outcome = double_auction(
            C,
            vec![Order::bid("b1", C, 15.0, 10)],
            vec![Order::ask("s1", C, 10.0, 5)],
        );
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].quantity, 5);
        assert_eq!(outcome.trades[0].price, 12.5);
        assert_eq!(outcome.total_volume, 5);
        assert_eq!(outcome.clearing_price, 12.5);
        assert_eq!(outcome.efficiency, 1.0);
    }

    #[test]
    fn test_no_crossing() {
        let outcome = double_auction(
            C,
            vec![Order::bid("b1", C, 10.0, 1)],
            vec![Order::ask("s1", C, 15.0, 1)],
        );
        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.total_volume, 0);
        assert_eq!(outcome.efficiency, 0.0);
        assert_eq!(outcome.clearing_price, 0.0);
    }

    #[test]
    fn test_one_sided_book() {
        let outcome = double_auction(C, vec![Order::bid("b1", C, 10.0, 1)], vec![]);
        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.bids.len(), 1);
        assert_eq!(outcome.efficiency, 0.0);
    }

    #[test]
    fn test_walks_multiple_levels() {
        let bids = vec![
            Order::bid("b1", C, 12.0, 3),
            Order::bid("b2", C, 20.0, 2),
            Order::bid("b3", C, 8.0, 5),
        ];
        let asks = vec![
            Order::ask("s1", C, 11.0, 4),
            Order::ask("s2", C, 9.0, 2),
        ];
        let outcome = double_auction(C, bids, asks);

        // b2 x s2 @14.5 (2), b1 x s1 @11.5 (3)
        assert_eq!(outcome.trades.len(), 2);
        assert_eq!(outcome.trades[0].buyer_id, "b2");
        assert_eq!(outcome.trades[0].seller_id, "s2");
        assert_eq!(outcome.trades[0].price, 14.5);
        assert_eq!(outcome.trades[1].buyer_id, "b1");
        assert_eq!(outcome.trades[1].seller_id, "s1");
        assert_eq!(outcome.trades[1].quantity, 3);
        assert_eq!(outcome.total_volume, 5);
        assert_eq!(outcome.clearing_price, 11.5);
        assert!((outcome.volume_weighted_price - (14.5 * 2.0 + 11.5 * 3.0) / 5.0).abs() < 1e-9);
        assert_eq!(outcome.ideal_volume, 5);
        assert_eq!(outcome.efficiency, 1.0);
    }

    #[test]
    fn test_ties_favor_first_submitted() {
        let bids = vec![Order::bid("early", C, 10.0, 1), Order::bid("late", C, 10.0, 1)];
        let asks = vec![Order::ask("s1", C, 9.0, 1)];
        let outcome = double_auction(C, bids, asks);
        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].buyer_id, "early");

        let bids = vec![Order::bid("b1", C, 10.0, 1)];
        let asks = vec![Order::ask("first", C, 9.0, 1), Order::ask("second", C, 9.0, 1)];
        let outcome = double_auction(C, bids, asks);
        assert_eq!(outcome.trades[0].seller_id, "first");
    }

    #[test]
    fn test_trade_prices_between_bid_and_ask() {
        let bids = vec![Order::bid("b1", C, 30.0, 2), Order::bid("b2", C, 18.0, 2)];
        let asks = vec![Order::ask("s1", C, 10.0, 1), Order::ask("s2", C, 17.0, 3)];
        let outcome = double_auction(C, bids, asks);
        for trade in &outcome.trades {
            assert!(trade.price >= 10.0 && trade.price <= 30.0);
        }
        assert_eq!(outcome.total_volume, 4);
    }

    #[test]
    fn test_clearing_point_from_depth() {
        let buy = vec![(12.0, 2), (10.0, 3)];
        let sell = vec![(9.0, 1), (11.0, 10)];
        let point = calculate_clearing_point(&buy, &sell).unwrap();
        assert_eq!(point.volume, 2);
        assert_eq!(point.price, 11.5);
        assert_eq!(point.bid_levels, 2);
        assert_eq!(point.ask_levels, 2);
    }

    #[test]
    fn test_clearing_point_none_without_cross() {
        assert!(calculate_clearing_point(&[(5.0, 1)], &[(6.0, 1)]).is_none());
        assert!(calculate_clearing_point(&[], &[(6.0, 1)]).is_none());
    }

    #[test]
    fn test_efficiency_bounds() {
        assert_eq!(efficiency(0, 0), 0.0);
        assert_eq!(efficiency(5, 10), 0.5);
        assert_eq!(efficiency(12, 10), 1.0);
    }

    #[test]
    fn test_to_result_records_price() {
        let outcome = double_auction(
            C,
            vec![Order::bid("b1", C, 12.0, 1)],
            vec![Order::ask("s1", C, 8.0, 1)],
        );
        let result = outcome.to_result();
        assert_eq!(result.clearing_price(), 10.0);
        assert_eq!(result.total_volume, 1);
        assert_eq!(result.cleared_trades.len(), 1);
    }
}
