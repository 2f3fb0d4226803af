use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use economy_service::config::Config;
use economy_service::models::{Commodity, TickEvent};
use economy_service::services::{
    AgentRegistry, HealthChecker, KafkaTickSource, MarketEventPublisher, MarketService,
    MemoryTickSource, Simulation, TickConsumer, TickSource,
};

/// Read before `Config` so configuration loading is logged too
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "economy_service=debug,rdkafka=warn".into());

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Feed hourly ticks into the in-memory source when no broker is configured
fn spawn_local_ticker(source: Arc<MemoryTickSource>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut hour: u32 = 0;
        loop {
            ticker.tick().await;
            let event = TickEvent::hourly(format!("local-{}", hour), Some(hour % 24));
            if let Err(e) = source.push_event(&event).await {
                warn!("⚠️ Local tick {} not queued: {}", hour, e);
            }
            hour = hour.wrapping_add(1);
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file first
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    info!("Loaded configuration for environment: {}", config.environment);

    if std::env::args().any(|arg| arg == "--simulate") {
        let mut simulation = Simulation::new(&config.agents)?;
        simulation.run(config.simulation.rounds);
        return Ok(());
    }

    let agents = if config.agents.default_population {
        AgentRegistry::with_default_population(&Commodity::ALL, config.agents.tuning())?
    } else {
        AgentRegistry::new()
    };
    let service = Arc::new(MarketService::new(&config, agents));

    let mut local_ticker = None;
    let source: Arc<dyn TickSource> = if config.kafka.enabled {
        info!(
            "🚀 Using Kafka tick source: servers={}, topic={}, group={}",
            config.kafka.bootstrap_servers, config.kafka.tick_topic, config.kafka.group_id
        );
        Arc::new(KafkaTickSource::new(&config.kafka)?)
    } else {
        info!(
            "⏸️ Kafka disabled (KAFKA_ENABLED=false), ticking locally every {}s",
            config.simulation.local_tick_interval_secs
        );
        let memory = Arc::new(MemoryTickSource::new(config.kafka.tick_topic.clone()));
        local_ticker = Some(spawn_local_ticker(
            memory.clone(),
            Duration::from_secs(config.simulation.local_tick_interval_secs.max(1)),
        ));
        memory
    };

    let mut consumer = TickConsumer::new(source, service.clone(), &config.kafka);
    if config.kafka.enabled && config.kafka.publish_enabled {
        consumer = consumer.with_publisher(Arc::new(MarketEventPublisher::new(&config.kafka)?));
    }
    let consumer = Arc::new(consumer);

    if let Err(e) = consumer.start().await {
        error!("❌ Tick consumer failed to start: {}", e);
    }

    let health = HealthChecker::new(consumer.clone(), service.clone(), config.environment.clone());
    let report = health.perform_health_check().await;
    info!("🩺 Startup health: {:?}", report.status);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    if let Some(ticker) = local_ticker {
        ticker.abort();
    }
    consumer.stop().await;
    service.shutdown().await;

    Ok(())
}
