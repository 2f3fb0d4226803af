use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::models::Commodity;
use crate::services::kafka::TickConsumer;
use crate::services::market_service::MarketService;

pub mod types;
pub use types::{DependencyHealth, DetailedHealthStatus, HealthCheckStatus};

/// Health checker service
#[derive(Clone)]
pub struct HealthChecker {
    start_time: Arc<Instant>,
    consumer: Arc<TickConsumer>,
    markets: Arc<MarketService>,
    environment: String,
    last_check: Arc<RwLock<Option<DetailedHealthStatus>>>,
}

impl HealthChecker {
    pub fn new(
        consumer: Arc<TickConsumer>,
        markets: Arc<MarketService>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            consumer,
            markets,
            environment: environment.into(),
            last_check: Arc::new(RwLock::new(None)),
        }
    }

    /// Get uptime in seconds
    pub fn get_uptime(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check the tick source has connected
    fn check_broker(&self) -> DependencyHealth {
        match self.consumer.health_check() {
            Ok(()) => DependencyHealth {
                name: "Tick source".to_string(),
                status: HealthCheckStatus::Healthy,
                response_time_ms: None,
                last_check: Utc::now(),
                error_message: None,
                details: Some(format!("phase {:?}", self.consumer.phase())),
            },
            Err(e) => DependencyHealth {
                name: "Tick source".to_string(),
                status: HealthCheckStatus::Unhealthy,
                response_time_ms: None,
                last_check: Utc::now(),
                error_message: Some(e.to_string()),
                details: None,
            },
        }
    }

    /// Check every market task answers
    async fn check_markets(&self) -> DependencyHealth {
        let start = Instant::now();
        let mut unavailable = Vec::new();
        for commodity in Commodity::ALL {
            if self.markets.market_state(commodity).await.is_err() {
                unavailable.push(commodity.as_str());
            }
        }

        let status = if unavailable.is_empty() {
            HealthCheckStatus::Healthy
        } else if unavailable.len() < Commodity::ALL.len() {
            HealthCheckStatus::Degraded
        } else {
            HealthCheckStatus::Unhealthy
        };

        DependencyHealth {
            name: "Markets".to_string(),
            status,
            response_time_ms: Some(start.elapsed().as_millis() as u64),
            last_check: Utc::now(),
            error_message: (!unavailable.is_empty())
                .then(|| format!("unavailable: {}", unavailable.join(", "))),
            details: Some(format!(
                "{}/{} markets responding",
                Commodity::ALL.len() - unavailable.len(),
                Commodity::ALL.len()
            )),
        }
    }

    /// Perform full health check
    pub async fn perform_health_check(&self) -> DetailedHealthStatus {
        let dependencies = vec![self.check_broker(), self.check_markets().await];
        let status = HealthCheckStatus::combine(dependencies.iter().map(|d| d.status));

        let report = DetailedHealthStatus {
            status,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: self.environment.clone(),
            uptime_seconds: self.get_uptime(),
            dependencies,
            clearing: self.markets.metrics_snapshot(),
            ticks: self.consumer.stats(),
            tick_phase: self.consumer.phase(),
        };

        // Cache the result
        *self.last_check.write().await = Some(report.clone());

        report
    }

    /// Get cached health check result
    pub async fn get_cached_health(&self) -> Option<DetailedHealthStatus> {
        self.last_check.read().await.clone()
    }
}
