use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{broker, clearing, market};

pub mod agent;
pub use agent::AgentConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub environment: String,
    pub kafka: KafkaConfig,
    pub clearing: ClearingConfig,
    pub agents: AgentConfig,
    pub simulation: SimulationConfig,
}

/// Broker settings for the tick consumer and the event publisher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub enabled: bool,
    pub bootstrap_servers: String,
    pub tick_topic: String,
    pub group_id: String,
    pub event_topic: String,
    pub publish_enabled: bool,
    pub session_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    /// Upper bound on a single read
    pub max_processing_time_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bootstrap_servers: "kafka:9092".to_string(),
            tick_topic: broker::TICK_TOPIC.to_string(),
            group_id: broker::CONSUMER_GROUP.to_string(),
            event_topic: broker::SIMULATION_EVENT_TOPIC.to_string(),
            publish_enabled: true,
            session_timeout_ms: 30_000,
            heartbeat_interval_ms: 10_000,
            max_processing_time_ms: 30_000,
        }
    }
}

impl KafkaConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.max_processing_time_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearingConfig {
    pub worker_pool_size: usize,
    pub queue_depth: usize,
    pub timeout_ms: u64,
    pub trade_retention_days: i64,
}

impl Default for ClearingConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: clearing::WORKER_POOL_SIZE,
            queue_depth: clearing::QUEUE_DEPTH,
            timeout_ms: clearing::TIMEOUT_MS,
            trade_retention_days: market::TRADE_RETENTION_DAYS,
        }
    }
}

impl ClearingConfig {
    /// Per-tick matching budget. Overruns are logged, never cancelled.
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            anyhow::bail!("CLEARING_WORKER_POOL_SIZE must be at least 1");
        }
        if self.queue_depth == 0 {
            anyhow::bail!("CLEARING_QUEUE_DEPTH must be at least 1");
        }
        if self.timeout_ms == 0 {
            anyhow::bail!("CLEARING_TIMEOUT_MS must be at least 1");
        }
        if self.trade_retention_days <= 0 {
            anyhow::bail!("TRADE_HISTORY_RETENTION_DAYS must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Interval of the local ticker used when Kafka is disabled
    pub local_tick_interval_secs: u64,
    pub rounds: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            local_tick_interval_secs: 3600,
            rounds: 10,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let kafka_defaults = KafkaConfig::default();
        let clearing_defaults = ClearingConfig::default();
        let simulation_defaults = SimulationConfig::default();

        let config = Config {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            kafka: KafkaConfig {
                enabled: env::var("KAFKA_ENABLED")
                    .map(|v| v.to_lowercase() == "true")
                    .unwrap_or(kafka_defaults.enabled),
                bootstrap_servers: env::var("KAFKA_BOOTSTRAP_SERVERS")
                    .unwrap_or(kafka_defaults.bootstrap_servers),
                tick_topic: env::var("KAFKA_TICK_TOPIC").unwrap_or(kafka_defaults.tick_topic),
                group_id: env::var("KAFKA_CONSUMER_GROUP").unwrap_or(kafka_defaults.group_id),
                event_topic: env::var("KAFKA_EVENT_TOPIC").unwrap_or(kafka_defaults.event_topic),
                publish_enabled: env_or("KAFKA_PUBLISH_ENABLED", kafka_defaults.publish_enabled),
                session_timeout_ms: env_or(
                    "KAFKA_SESSION_TIMEOUT_MS",
                    kafka_defaults.session_timeout_ms,
                ),
                heartbeat_interval_ms: env_or(
                    "KAFKA_HEARTBEAT_INTERVAL_MS",
                    kafka_defaults.heartbeat_interval_ms,
                ),
                max_processing_time_ms: env_or(
                    "KAFKA_MAX_PROCESSING_TIME_MS",
                    kafka_defaults.max_processing_time_ms,
                ),
            },
            clearing: ClearingConfig {
                worker_pool_size: env_or(
                    "CLEARING_WORKER_POOL_SIZE",
                    clearing_defaults.worker_pool_size,
                ),
                queue_depth: env_or("CLEARING_QUEUE_DEPTH", clearing_defaults.queue_depth),
                timeout_ms: env_or("CLEARING_TIMEOUT_MS", clearing_defaults.timeout_ms),
                trade_retention_days: env_or(
                    "TRADE_HISTORY_RETENTION_DAYS",
                    clearing_defaults.trade_retention_days,
                ),
            },
            agents: AgentConfig::from_env()
                .map_err(|e| anyhow::anyhow!("Failed to load agent config: {}", e))?,
            simulation: SimulationConfig {
                local_tick_interval_secs: env_or(
                    "LOCAL_TICK_INTERVAL_SECS",
                    simulation_defaults.local_tick_interval_secs,
                ),
                rounds: env_or("SIMULATION_ROUNDS", simulation_defaults.rounds),
            },
        };

        config.clearing.validate()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            kafka: KafkaConfig::default(),
            clearing: ClearingConfig::default(),
            agents: AgentConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}
