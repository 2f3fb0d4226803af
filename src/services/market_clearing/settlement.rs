use std::collections::HashSet;
use tracing::{debug, warn};

use super::matching::MatchOutcome;
use crate::services::agent::AgentRegistry;

const WEALTH_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementReport {
    /// Trades whose buyer and seller were both settled
    pub settled_trades: usize,
    /// Agent ids named by a trade but absent from the registry
    pub missing_agents: Vec<String>,
    /// Trades dropped because the buyer could no longer pay for them
    pub unfunded_trades: Vec<String>,
    /// Agents told their order went unfilled
    pub unfilled_agents: usize,
}

/// Apply one market's matches to the agents.
///
/// Buyers pay `price * quantity` and receive the units; sellers the
/// reverse. Both sides then tighten their belief around the trade price.
/// An agent that cannot be resolved is logged and skipped; the trade
/// itself stands. A trade whose buyer holds less than its value (possible
/// once earlier markets in the same tick have been settled) moves nothing
/// on either side. Agents whose orders found no counterparty widen their
/// belief instead.
pub fn settle(agents: &mut AgentRegistry, outcome: &MatchOutcome) -> SettlementReport {
    let commodity = outcome.commodity;
    let mut report = SettlementReport::default();
    let mut buyers_filled: HashSet<&str> = HashSet::new();
    let mut sellers_filled: HashSet<&str> = HashSet::new();

    for trade in &outcome.trades {
        let value = trade.value();
        let mut complete = true;

        if let Some(buyer) = agents.get(&trade.buyer_id) {
            if buyer.wealth() + WEALTH_TOLERANCE < value {
                warn!(
                    "⚠️ Settlement skipped for trade {} ({}): buyer {} holds {:.2}, owes {:.2}",
                    trade.id,
                    commodity,
                    trade.buyer_id,
                    buyer.wealth(),
                    value
                );
                report.unfunded_trades.push(trade.id.to_string());
                continue;
            }
        }

        match agents.get_mut(&trade.buyer_id) {
            Some(buyer) => {
                buyer.update_belief(commodity, true, trade.price, false, trade.quantity, -value)
            }
            None => {
                warn!(
                    "⚠️ Settlement skipped for unknown buyer {} on trade {} ({})",
                    trade.buyer_id, trade.id, commodity
                );
                report.missing_agents.push(trade.buyer_id.clone());
                complete = false;
            }
        }

        match agents.get_mut(&trade.seller_id) {
            Some(seller) => {
                seller.update_belief(commodity, true, trade.price, true, trade.quantity, value)
            }
            None => {
                warn!(
                    "⚠️ Settlement skipped for unknown seller {} on trade {} ({})",
                    trade.seller_id, trade.id, commodity
                );
                report.missing_agents.push(trade.seller_id.clone());
                complete = false;
            }
        }

        buyers_filled.insert(&trade.buyer_id);
        sellers_filled.insert(&trade.seller_id);
        if complete {
            report.settled_trades += 1;
        }
    }

    let reference_price = outcome.clearing_price;
    let unfilled_bids = outcome
        .bids
        .iter()
        .filter(|o| !buyers_filled.contains(o.agent_id.as_str()))
        .map(|o| (o.agent_id.as_str(), false));
    let unfilled_asks = outcome
        .asks
        .iter()
        .filter(|o| !sellers_filled.contains(o.agent_id.as_str()))
        .map(|o| (o.agent_id.as_str(), true));

    let mut notified: HashSet<(&str, bool)> = HashSet::new();
    for (agent_id, is_seller) in unfilled_bids.chain(unfilled_asks) {
        if !notified.insert((agent_id, is_seller)) {
            continue;
        }
        match agents.get_mut(agent_id) {
            Some(agent) => {
                agent.update_belief(commodity, false, reference_price, is_seller, 0, 0.0);
                report.unfilled_agents += 1;
            }
            None => debug!("Unfilled order from unregistered agent {}", agent_id),
        }
    }

    report
}
