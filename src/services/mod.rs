// Business logic services
// Agents, market clearing, tick orchestration

pub mod agent;
pub mod health_check;
pub mod kafka;
pub mod market_clearing;
pub mod market_service;
pub mod metrics;
pub mod simulation;

pub use agent::{AgentRegistry, BeliefTuning, Personality, PriceBelief, TradingAgent};
pub use health_check::HealthChecker;
pub use kafka::{
    EventPublisher, KafkaTickSource, MarketEventPublisher, MemoryTickSource, TickConsumer,
    TickSource,
};
pub use market_clearing::Market;
pub use market_service::{MarketClearer, MarketService};
pub use simulation::Simulation;
