use crate::constants::market;
use crate::error::{EconomyError, Result};
use crate::models::{Commodity, Order, OrderType};

/// Batch order book for one commodity.
///
/// Orders accumulate in submission order until the next clearing pass,
/// which takes the whole book. Nothing is matched on insertion.
#[derive(Debug, Clone)]
pub struct OrderBook {
    commodity: Commodity,
    bids: Vec<Order>,
    asks: Vec<Order>,
}

impl OrderBook {
    pub fn new(commodity: Commodity) -> Self {
        Self {
            commodity,
            bids: Vec::with_capacity(market::BOOK_CAPACITY),
            asks: Vec::with_capacity(market::BOOK_CAPACITY),
        }
    }

    /// Add order to the book, rejecting invalid or foreign orders
    pub fn add_order(&mut self, order: Order) -> Result<()> {
        if order.commodity != self.commodity {
            return Err(EconomyError::invalid_order(format!(
                "order {} is for {}, not {}",
                order.id, order.commodity, self.commodity
            )));
        }
        order.validate()?;

        match order.order_type {
            OrderType::Bid => self.bids.push(order),
            OrderType::Ask => self.asks.push(order),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Copy of every resting order, bids first
    pub fn snapshot(&self) -> Vec<Order> {
        self.bids.iter().chain(self.asks.iter()).cloned().collect()
    }

    /// Remove and return all orders as (bids, asks), leaving the book empty
    pub fn take(&mut self) -> (Vec<Order>, Vec<Order>) {
        let bids = std::mem::replace(&mut self.bids, Vec::with_capacity(market::BOOK_CAPACITY));
        let asks = std::mem::replace(&mut self.asks, Vec::with_capacity(market::BOOK_CAPACITY));
        (bids, asks)
    }
}
