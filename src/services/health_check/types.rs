use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::kafka::{ConsumerStatsSnapshot, TickPhase};
use crate::services::market_service::ServiceMetricsSnapshot;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealthStatus {
    pub status: HealthCheckStatus,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub environment: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
    pub clearing: ServiceMetricsSnapshot,
    pub ticks: ConsumerStatsSnapshot,
    pub tick_phase: TickPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthCheckStatus,
    pub response_time_ms: Option<u64>,
    pub last_check: DateTime<Utc>,
    pub error_message: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthCheckStatus {
    /// Healthy only if every part is; unhealthy if any part is
    pub fn combine(statuses: impl IntoIterator<Item = HealthCheckStatus>) -> Self {
        statuses
            .into_iter()
            .fold(HealthCheckStatus::Healthy, |acc, s| match (acc, s) {
                (HealthCheckStatus::Unhealthy, _) | (_, HealthCheckStatus::Unhealthy) => {
                    HealthCheckStatus::Unhealthy
                }
                (HealthCheckStatus::Degraded, _) | (_, HealthCheckStatus::Degraded) => {
                    HealthCheckStatus::Degraded
                }
                _ => HealthCheckStatus::Healthy,
            })
    }
}
