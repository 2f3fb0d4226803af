use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::models::commodity::Commodity;

pub type Result<T> = std::result::Result<T, EconomyError>;

/// Error codes for categorizing errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation errors (3xxx)
    #[serde(rename = "VAL_3001")]
    InvalidInput,
    #[serde(rename = "VAL_3002")]
    MissingRequiredField,
    #[serde(rename = "VAL_3003")]
    InvalidFormat,
    #[serde(rename = "VAL_3005")]
    InvalidAmount,
    #[serde(rename = "VAL_3009")]
    InvalidPrice,
    #[serde(rename = "VAL_3010")]
    UnsupportedTickType,

    // Resource errors (4xxx)
    #[serde(rename = "RES_4001")]
    NotFound,

    // Business logic errors (5xxx)
    #[serde(rename = "BIZ_5002")]
    OrderNotMatched,
    #[serde(rename = "BIZ_5007")]
    ClearingFailed,
    #[serde(rename = "BIZ_5008")]
    MarketUnavailable,

    // External service errors (8xxx)
    #[serde(rename = "EXT_8001")]
    BrokerUnavailable,
    #[serde(rename = "EXT_8002")]
    BrokerTimeout,

    // Internal errors (9xxx)
    #[serde(rename = "INT_9999")]
    InternalServerError,
    #[serde(rename = "INT_9998")]
    ConfigurationError,
}

impl ErrorCode {
    /// Get numeric code
    pub fn code(&self) -> u16 {
        match self {
            // Validation
            ErrorCode::InvalidInput => 3001,
            ErrorCode::MissingRequiredField => 3002,
            ErrorCode::InvalidFormat => 3003,
            ErrorCode::InvalidAmount => 3005,
            ErrorCode::InvalidPrice => 3009,
            ErrorCode::UnsupportedTickType => 3010,

            // Resource
            ErrorCode::NotFound => 4001,

            // Business Logic
            ErrorCode::OrderNotMatched => 5002,
            ErrorCode::ClearingFailed => 5007,
            ErrorCode::MarketUnavailable => 5008,

            // External Service
            ErrorCode::BrokerUnavailable => 8001,
            ErrorCode::BrokerTimeout => 8002,

            // Internal
            ErrorCode::InternalServerError => 9999,
            ErrorCode::ConfigurationError => 9998,
        }
    }

    /// Get user-friendly message
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input provided",
            ErrorCode::MissingRequiredField => "Required field is missing",
            ErrorCode::InvalidFormat => "Invalid format provided",
            ErrorCode::InvalidAmount => "Order quantity must be positive",
            ErrorCode::InvalidPrice => "Order price must be a non-negative number",
            ErrorCode::UnsupportedTickType => "Only hourly ticks are supported",

            ErrorCode::NotFound => "The requested resource was not found",

            ErrorCode::OrderNotMatched => "No matching orders found",
            ErrorCode::ClearingFailed => "Market clearing failed",
            ErrorCode::MarketUnavailable => "Market is not accepting commands",

            ErrorCode::BrokerUnavailable => "Message broker is currently unavailable",
            ErrorCode::BrokerTimeout => "Message broker request timed out",

            ErrorCode::InternalServerError => "An internal error occurred",
            ErrorCode::ConfigurationError => "Service configuration error",
        }
    }
}

#[derive(Debug, Error)]
pub enum EconomyError {
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported tick type: {0}")]
    UnsupportedTickType(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Clearing failed: {0}")]
    Clearing(String),

    #[error("Market unavailable: {0}")]
    MarketUnavailable(Commodity),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EconomyError {
    /// Helper: order rejected at submission
    pub fn invalid_order(message: impl Into<String>) -> Self {
        EconomyError::InvalidOrder(message.into())
    }

    /// Helper: Not found
    pub fn not_found(resource: &str) -> Self {
        EconomyError::NotFound(format!("{} not found", resource))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EconomyError::InvalidOrder(message) if message.contains("price") => {
                ErrorCode::InvalidPrice
            }
            EconomyError::InvalidOrder(_) => ErrorCode::InvalidAmount,
            EconomyError::Validation(_) => ErrorCode::InvalidInput,
            EconomyError::UnsupportedTickType(_) => ErrorCode::UnsupportedTickType,
            EconomyError::MalformedEvent(_) => ErrorCode::InvalidFormat,
            EconomyError::Serialization(_) => ErrorCode::InvalidFormat,
            EconomyError::Broker(_) => ErrorCode::BrokerUnavailable,
            EconomyError::Clearing(_) => ErrorCode::ClearingFailed,
            EconomyError::MarketUnavailable(_) => ErrorCode::MarketUnavailable,
            EconomyError::NotFound(_) => ErrorCode::NotFound,
            EconomyError::Configuration(_) => ErrorCode::ConfigurationError,
            EconomyError::Internal(_) => ErrorCode::InternalServerError,
        }
    }

    /// Log error with appropriate level, tagged with its numeric code
    pub fn log(&self) {
        let code = self.code();
        match self {
            EconomyError::Broker(_)
            | EconomyError::Clearing(_)
            | EconomyError::Internal(_)
            | EconomyError::Configuration(_) => {
                error!(code = code.code(), "❌ {}", self);
            }
            _ => {
                warn!(code = code.code(), "⚠️ {}", self);
            }
        }
    }
}

impl From<rdkafka::error::KafkaError> for EconomyError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        EconomyError::Broker(err.to_string())
    }
}

impl From<validator::ValidationErrors> for EconomyError {
    fn from(err: validator::ValidationErrors) -> Self {
        EconomyError::Validation(err.to_string())
    }
}
