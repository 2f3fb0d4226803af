use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::constants::broker;
use crate::error::{EconomyError, Result};

/// World tick event as published on the tick topic
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TickEvent {
    #[validate(length(min = 1, message = "event_id is required"))]
    pub event_id: String,
    #[serde(default)]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[validate(nested)]
    pub data: TickData,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TickData {
    #[validate(length(min = 1, message = "tick_id is required"))]
    pub tick_id: String,
    #[validate(length(min = 1, message = "tick_type is required"))]
    pub tick_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_day: Option<u32>,
    #[serde(default)]
    pub game_time: String,
    #[serde(default)]
    pub tick_timestamp: String,
    #[serde(default)]
    pub triggered_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl TickEvent {
    /// Parse and validate a raw broker payload.
    ///
    /// Fails with `MalformedEvent` when the payload does not deserialize,
    /// `Validation` when required fields are empty, and
    /// `UnsupportedTickType` for anything other than hourly ticks.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let event: TickEvent = serde_json::from_slice(payload)
            .map_err(|e| EconomyError::MalformedEvent(e.to_string()))?;
        event.validate()?;

        if event.data.tick_type != broker::SUPPORTED_TICK_TYPE {
            return Err(EconomyError::UnsupportedTickType(event.data.tick_type.clone()));
        }

        Ok(event)
    }

    pub fn tick_id(&self) -> &str {
        &self.data.tick_id
    }

    pub fn game_hour(&self) -> Option<u32> {
        self.data.game_hour
    }

    /// Build an hourly tick, used by the local ticker
    pub fn hourly(tick_id: impl Into<String>, game_hour: Option<u32>) -> Self {
        let now = Utc::now();
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: "world.tick.hourly".to_string(),
            timestamp: now,
            version: Some("1.0".to_string()),
            source: Some("economy-service".to_string()),
            data: TickData {
                tick_id: tick_id.into(),
                tick_type: broker::SUPPORTED_TICK_TYPE.to_string(),
                game_hour,
                game_day: None,
                game_time: now.to_rfc3339(),
                tick_timestamp: now.to_rfc3339(),
                triggered_by: "local-ticker".to_string(),
                consumers: None,
                metadata: None,
            },
        }
    }
}
