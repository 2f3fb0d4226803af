use anyhow::Result;
use economy_service::config::Config;
use economy_service::models::{Commodity, Order};
use economy_service::services::agent::{AgentRegistry, TradingAgent};
use economy_service::services::{MarketClearer, MarketService};
use economy_service::EconomyError;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.agents.default_population = false;
    config.agents.rng_seed = Some(11);
    config.clearing.worker_pool_size = 2;
    config
}

#[tokio::test]
async fn test_all_markets_clear_in_one_tick() -> Result<()> {
    init_logging();
    let service = MarketService::new(&test_config(), AgentRegistry::new());

    for (i, commodity) in Commodity::ALL.into_iter().enumerate() {
        let price = 10.0 + i as f64;
        service
            .submit_order(Order::bid(format!("b-{}", commodity), commodity, price + 2.0, 3))
            .await?;
        service
            .submit_order(Order::ask(format!("s-{}", commodity), commodity, price, 3))
            .await?;
    }

    let results = service.clear_markets("tick-all").await?;
    let commodities: Vec<Commodity> = results.iter().map(|r| r.commodity).collect();
    assert_eq!(commodities, Commodity::ALL.to_vec());

    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.total_volume, 3);
        assert_eq!(result.clearing_price(), 11.0 + i as f64);
        assert_eq!(result.market_efficiency, 1.0);
    }
    println!("✅ {} markets cleared in one tick", results.len());

    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_agent_trading_two_commodities_settles_once_per_trade() -> Result<()> {
    init_logging();
    let mut agents = AgentRegistry::new();
    agents.insert(TradingAgent::new("trader", 500.0));
    agents.insert(
        TradingAgent::new("farmer", 0.0)
            .with_inventory(Commodity::Food, 10)
            .with_inventory(Commodity::Wood, 10),
    );
    let service = MarketService::new(&test_config(), agents);

    service.submit_order(Order::bid("trader", Commodity::Food, 10.0, 5)).await?;
    service.submit_order(Order::ask("farmer", Commodity::Food, 10.0, 5)).await?;
    service.submit_order(Order::bid("trader", Commodity::Wood, 20.0, 2)).await?;
    service.submit_order(Order::ask("farmer", Commodity::Wood, 20.0, 2)).await?;

    service.clear_markets("tick-multi").await?;

    let registry = service.agents();
    let registry = registry.lock().await;
    let trader = registry.get("trader").unwrap();
    let farmer = registry.get("farmer").unwrap();
    assert_eq!(trader.wealth(), 500.0 - 50.0 - 40.0);
    assert_eq!(farmer.wealth(), 90.0);
    assert_eq!(trader.inventory(Commodity::Food), 5);
    assert_eq!(trader.inventory(Commodity::Wood), 2);
    assert_eq!(farmer.inventory(Commodity::Food), 5);
    assert_eq!(farmer.inventory(Commodity::Wood), 8);
    println!("✅ Cross-market settlement applied exactly once");
    Ok(())
}

#[tokio::test]
async fn test_rejected_orders_leave_book_untouched() -> Result<()> {
    init_logging();
    let service = MarketService::new(&test_config(), AgentRegistry::new());

    let zero = service.submit_order(Order::bid("b", Commodity::Metal, 5.0, 0)).await;
    let negative = service.submit_order(Order::ask("s", Commodity::Metal, -5.0, 1)).await;
    assert!(matches!(zero, Err(EconomyError::InvalidOrder(_))));
    assert!(matches!(negative, Err(EconomyError::InvalidOrder(_))));

    let state = service.market_state(Commodity::Metal).await?;
    assert!(state.active_orders.is_empty());

    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_state_and_history_follow_clearings() -> Result<()> {
    init_logging();
    let service = MarketService::new(&test_config(), AgentRegistry::new());

    for (tick, (bid, ask)) in [(11.0, 9.0), (13.0, 11.0), (15.0, 13.0)].into_iter().enumerate() {
        service.submit_order(Order::bid("b", Commodity::Weapon, bid, 1)).await?;
        service.submit_order(Order::ask("s", Commodity::Weapon, ask, 1)).await?;
        service.clear_markets(&format!("tick-{}", tick)).await?;
    }

    let history = service.price_history(Commodity::Weapon).await?;
    assert_eq!(history, vec![10.0, 12.0, 14.0]);

    let state = service.market_state(Commodity::Weapon).await?;
    assert_eq!(state.last_price, 14.0);
    assert!((state.trend - 0.4).abs() < 1e-9);
    assert_eq!(state.volume_24h, 3);

    let untouched = service.price_history(Commodity::Crystal).await?;
    assert_eq!(untouched, vec![0.0, 0.0, 0.0]);

    service.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_default_population_trades_over_ticks() -> Result<()> {
    init_logging();
    let mut config = test_config();
    config.agents.default_population = true;
    let agents = AgentRegistry::with_default_population(&Commodity::ALL, config.agents.tuning())?;
    let before = agents.total_wealth();
    let service = MarketService::new(&config, agents);

    let mut volume = 0;
    for tick in 0..10 {
        let results = service.clear_markets(&format!("tick-{}", tick)).await?;
        volume += results.iter().map(|r| r.total_volume).sum::<u64>();
    }
    assert!(volume > 0);

    let registry = service.agents();
    let after = registry.lock().await.total_wealth();
    assert!((after - before).abs() < 1e-6);

    let snapshot = service.metrics_snapshot();
    assert_eq!(snapshot.successful_clearings, 10);
    assert_eq!(snapshot.active_markets, Commodity::ALL.len());
    println!("✅ Default population traded {} units over 10 ticks", volume);

    service.shutdown().await;
    Ok(())
}
