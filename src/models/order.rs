use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commodity::Commodity;
use crate::error::{EconomyError, Result};

/// Order side (Bid to buy, Ask to sell)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Bid,
    Ask,
}

/// Priced intent to trade one commodity, attributed to an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub agent_id: String,
    pub commodity: Commodity,
    pub order_type: OrderType,
    pub price: f64,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        agent_id: impl Into<String>,
        commodity: Commodity,
        order_type: OrderType,
        price: f64,
        quantity: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            commodity,
            order_type,
            price,
            quantity,
            created_at: Utc::now(),
        }
    }

    pub fn bid(agent_id: impl Into<String>, commodity: Commodity, price: f64, quantity: u32) -> Self {
        Self::new(agent_id, commodity, OrderType::Bid, price, quantity)
    }

    pub fn ask(agent_id: impl Into<String>, commodity: Commodity, price: f64, quantity: u32) -> Self {
        Self::new(agent_id, commodity, OrderType::Ask, price, quantity)
    }

    /// Check the submission rules: positive quantity, finite non-negative price
    pub fn validate(&self) -> Result<()> {
        if self.quantity == 0 {
            return Err(EconomyError::invalid_order(format!(
                "order {} quantity must be positive",
                self.id
            )));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(EconomyError::invalid_order(format!(
                "order {} price must be non-negative, got {}",
                self.id, self.price
            )));
        }
        Ok(())
    }

    pub fn is_bid(&self) -> bool {
        self.order_type == OrderType::Bid
    }

    /// Notional value of the order
    pub fn notional(&self) -> f64 {
        self.price * self.quantity as f64
    }
}
