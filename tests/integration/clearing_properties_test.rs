use economy_service::models::{Commodity, Order};
use economy_service::services::agent::{AgentRegistry, Personality, TradingAgent};
use economy_service::services::market_clearing::{double_auction, Market};
use proptest::prelude::*;

const C: Commodity = Commodity::Food;

fn order_strategy() -> impl Strategy<Value = (f64, u32)> {
    (0.0f64..100.0, 1u32..50)
}

fn books() -> impl Strategy<Value = (Vec<(f64, u32)>, Vec<(f64, u32)>)> {
    (
        prop::collection::vec(order_strategy(), 0..20),
        prop::collection::vec(order_strategy(), 0..20),
    )
}

fn to_orders(bids: &[(f64, u32)], asks: &[(f64, u32)]) -> (Vec<Order>, Vec<Order>) {
    let bids = bids
        .iter()
        .enumerate()
        .map(|(i, (p, q))| Order::bid(format!("b{}", i), C, *p, *q))
        .collect();
    let asks = asks
        .iter()
        .enumerate()
        .map(|(i, (p, q))| Order::ask(format!("s{}", i), C, *p, *q))
        .collect();
    (bids, asks)
}

proptest! {
    #[test]
    fn traded_volume_never_exceeds_crossable_volume((bids, asks) in books()) {
        let (bid_orders, ask_orders) = to_orders(&bids, &asks);
        let outcome = double_auction(C, bid_orders, ask_orders);

        let traded: u64 = outcome.trades.iter().map(|t| t.quantity as u64).sum();
        prop_assert_eq!(traded, outcome.total_volume);

        if !outcome.trades.is_empty() {
            let price = outcome.clearing_price;
            let demand: u64 = bids.iter().filter(|(p, _)| *p >= price).map(|(_, q)| *q as u64).sum();
            let supply: u64 = asks.iter().filter(|(p, _)| *p <= price).map(|(_, q)| *q as u64).sum();
            prop_assert!(traded <= demand.min(supply));
        }
    }

    #[test]
    fn trade_price_lies_between_ask_and_bid((bids, asks) in books()) {
        let (bid_orders, ask_orders) = to_orders(&bids, &asks);
        let outcome = double_auction(C, bid_orders.clone(), ask_orders.clone());

        for trade in &outcome.trades {
            let bid = bid_orders.iter().find(|o| o.agent_id == trade.buyer_id).unwrap();
            let ask = ask_orders.iter().find(|o| o.agent_id == trade.seller_id).unwrap();
            prop_assert!(trade.price >= ask.price - 1e-9);
            prop_assert!(trade.price <= bid.price + 1e-9);
        }
    }

    #[test]
    fn efficiency_stays_in_unit_interval((bids, asks) in books()) {
        let (bid_orders, ask_orders) = to_orders(&bids, &asks);
        let outcome = double_auction(C, bid_orders, ask_orders);
        prop_assert!((0.0..=1.0).contains(&outcome.efficiency));
        if outcome.total_volume == 0 {
            prop_assert_eq!(outcome.efficiency, 0.0);
        }
    }

    #[test]
    fn every_clear_appends_one_history_entry(passes in prop::collection::vec(books(), 1..6)) {
        let mut market = Market::new(C);
        let mut agents = AgentRegistry::new();
        for (i, (bids, asks)) in passes.iter().enumerate() {
            let (bid_orders, ask_orders) = to_orders(bids, asks);
            for order in bid_orders.into_iter().chain(ask_orders) {
                market.add_order(order).unwrap();
            }
            let result = market.clear(&mut agents);
            prop_assert_eq!(market.history().len(), i + 1);
            prop_assert_eq!(market.last_price(), result.clearing_price());
            prop_assert!(market.order_book().is_empty());
        }
    }

    #[test]
    fn beliefs_stay_valid_under_any_updates(
        start in (0.0f64..50.0, 0.0f64..50.0),
        learning_rate in 0.0f64..=1.0,
        updates in prop::collection::vec((any::<bool>(), 0.0f64..200.0, any::<bool>()), 0..60),
    ) {
        let (a, b) = start;
        let mut agent = TradingAgent::new("agent", 1_000.0)
            .with_personality(Personality::new(0.5, 0.5, 0.3, learning_rate));
        agent.set_price_belief(C, a.min(b), a.max(b)).unwrap();

        for (success, price, is_seller) in updates {
            agent.update_belief(C, success, price, is_seller, 0, 0.0);
            let belief = agent.price_belief(C).unwrap();
            prop_assert!(belief.min() < belief.max());
            prop_assert!(belief.min() >= 0.0);
        }
    }
}

#[test]
fn test_partial_fill_example() {
    let outcome = double_auction(
        C,
        vec![Order::bid("b", C, 15.0, 10)],
        vec![Order::ask("s", C, 10.0, 5)],
    );
    assert_eq!(outcome.trades.len(), 1);
    assert_eq!(outcome.trades[0].quantity, 5);
    assert_eq!(outcome.trades[0].price, 12.5);
    println!("✅ Partial fill matched 5 of 10 units");
}

#[test]
fn test_no_match_example() {
    let outcome = double_auction(
        C,
        vec![Order::bid("b", C, 10.0, 3)],
        vec![Order::ask("s", C, 15.0, 3)],
    );
    assert!(outcome.trades.is_empty());
    assert_eq!(outcome.total_volume, 0);
    assert_eq!(outcome.efficiency, 0.0);
    println!("✅ Uncrossed book produced no trades");
}
