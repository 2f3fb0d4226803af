use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::models::Commodity;

/// Track one clearing pass of a market
pub fn track_market_clearing(
    commodity: Commodity,
    trades: usize,
    volume: u64,
    efficiency: f64,
    duration: Duration,
) {
    let status = if trades > 0 { "matched" } else { "empty" };
    counter!(
        "economy_market_clearings_total",
        "commodity" => commodity.as_str(),
        "status" => status
    )
    .increment(1);

    counter!("economy_trades_executed_total", "commodity" => commodity.as_str())
        .increment(trades as u64);
    counter!("economy_volume_traded_total", "commodity" => commodity.as_str()).increment(volume);
    gauge!("economy_market_efficiency", "commodity" => commodity.as_str()).set(efficiency);
    histogram!("economy_clearing_duration_seconds", "commodity" => commodity.as_str())
        .record(duration.as_secs_f64());
}

/// Track a market whose outcome could not be delivered
pub fn track_clearing_failure(commodity: Commodity, reason: &'static str) {
    counter!(
        "economy_market_clearings_total",
        "commodity" => commodity.as_str(),
        "status" => reason
    )
    .increment(1);
}

/// Track a tick whose matching ran past the clearing budget
pub fn track_clearing_over_budget(elapsed: Duration) {
    counter!("economy_clearing_over_budget_total").increment(1);
    histogram!("economy_clearing_over_budget_seconds").record(elapsed.as_secs_f64());
}

/// Track a rejected order
pub fn track_order_rejected(commodity: Commodity) {
    counter!(
        "economy_orders_rejected_total",
        "commodity" => commodity.as_str(),
        "reason" => "invalid"
    )
    .increment(1);
}

/// Track the outcome of one tick
pub fn track_tick(outcome: &'static str) {
    counter!("economy_ticks_total", "outcome" => outcome).increment(1);
}

/// Track a failed event publish
pub fn track_publish_failure() {
    counter!("economy_publish_failures_total").increment(1);
}
