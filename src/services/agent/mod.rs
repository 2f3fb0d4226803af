//! Trading agents and their adaptive price beliefs.
//!
//! An agent holds wealth, an inventory per commodity and a price belief
//! interval per commodity. Before each clearing it may place one order per
//! commodity ([`TradingAgent::decide_trade`]); after clearing, settlement
//! reports the outcome back through [`TradingAgent::update_belief`], which is
//! the only place an agent's state changes.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::constants::agent as limits;
use crate::error::{EconomyError, Result};
use crate::models::{Commodity, MarketState, Order};

pub mod registry;
pub use registry::AgentRegistry;

/// Subjective fair-price interval for one commodity. `min < max` always holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceBelief {
    min: f64,
    max: f64,
}

impl PriceBelief {
    /// Build a belief; equal bounds are widened to the minimum width.
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(EconomyError::Validation(format!(
                "price belief bounds must be finite, got [{}, {}]",
                min, max
            )));
        }
        if min < 0.0 {
            return Err(EconomyError::Validation(format!(
                "price belief minimum must be non-negative, got {}",
                min
            )));
        }
        if min > max {
            return Err(EconomyError::Validation(format!(
                "price belief minimum {} exceeds maximum {}",
                min, max
            )));
        }

        let mut belief = Self { min, max };
        belief.normalize();
        Ok(belief)
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn mean(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }

    /// Re-centre on `price` and shrink the width by `rate`.
    fn converge(&mut self, price: f64, rate: f64) {
        let width = (self.width() * (1.0 - rate)).max(limits::MIN_BELIEF_WIDTH);
        self.min = price - width / 2.0;
        self.max = price + width / 2.0;
        self.normalize();
    }

    /// Widen downward (sellers) or upward (buyers).
    fn expand(&mut self, rate: f64, downward: bool) {
        let step = (self.width() * rate).max(limits::MIN_EXPANSION_STEP);
        if downward {
            self.min -= step;
        } else {
            self.max += step;
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        self.min = self.min.clamp(0.0, limits::MAX_BELIEF_PRICE - limits::MIN_BELIEF_WIDTH);
        self.max = self.max.min(limits::MAX_BELIEF_PRICE);
        if self.max - self.min < limits::MIN_BELIEF_WIDTH {
            self.max = self.min + limits::MIN_BELIEF_WIDTH;
        }
    }
}

/// Behavioural traits, each in [0, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Personality {
    pub risk_tolerance: f64,
    pub impatience_factor: f64,
    pub social_influence: f64,
    pub learning_rate: f64,
}

impl Personality {
    pub fn new(
        risk_tolerance: f64,
        impatience_factor: f64,
        social_influence: f64,
        learning_rate: f64,
    ) -> Self {
        let unit = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            risk_tolerance: unit(risk_tolerance),
            impatience_factor: unit(impatience_factor),
            social_influence: unit(social_influence),
            learning_rate: unit(learning_rate),
        }
    }
}

impl Default for Personality {
    fn default() -> Self {
        Self::new(0.5, 0.5, 0.3, 0.5)
    }
}

/// Constants governing belief adaptation and bid sizing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BeliefTuning {
    pub convergence: f64,
    pub expansion: f64,
    pub max_bid_quantity: u32,
}

impl Default for BeliefTuning {
    fn default() -> Self {
        Self {
            convergence: limits::BELIEF_CONVERGENCE,
            expansion: limits::BELIEF_EXPANSION,
            max_bid_quantity: limits::MAX_BID_QUANTITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingAgent {
    pub id: String,
    wealth: f64,
    inventory: BTreeMap<Commodity, u32>,
    price_beliefs: BTreeMap<Commodity, PriceBelief>,
    pub personality: Personality,
    pub tuning: BeliefTuning,
}

impl TradingAgent {
    pub fn new(id: impl Into<String>, wealth: f64) -> Self {
        Self {
            id: id.into(),
            wealth: if wealth.is_finite() { wealth.max(0.0) } else { 0.0 },
            inventory: BTreeMap::new(),
            price_beliefs: BTreeMap::new(),
            personality: Personality::default(),
            tuning: BeliefTuning::default(),
        }
    }

    pub fn with_personality(mut self, personality: Personality) -> Self {
        self.personality = personality;
        self
    }

    pub fn with_tuning(mut self, tuning: BeliefTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_inventory(mut self, commodity: Commodity, quantity: u32) -> Self {
        self.inventory.insert(commodity, quantity);
        self
    }

    pub fn wealth(&self) -> f64 {
        self.wealth
    }

    pub fn inventory(&self, commodity: Commodity) -> u32 {
        self.inventory.get(&commodity).copied().unwrap_or(0)
    }

    pub fn price_belief(&self, commodity: Commodity) -> Option<&PriceBelief> {
        self.price_beliefs.get(&commodity)
    }

    /// Initialize or overwrite the belief for one commodity
    pub fn set_price_belief(&mut self, commodity: Commodity, min: f64, max: f64) -> Result<()> {
        let belief = PriceBelief::new(min, max)?;
        self.price_beliefs.insert(commodity, belief);
        Ok(())
    }

    /// Decide this round's order for `commodity`, if any.
    ///
    /// Producers offer their whole inventory; consumers bid for a small
    /// quantity they can afford. Does not change the agent.
    pub fn decide_trade<R: Rng>(
        &self,
        commodity: Commodity,
        state: &MarketState,
        is_producer: bool,
        rng: &mut R,
    ) -> Option<Order> {
        let belief = self.price_beliefs.get(&commodity)?;
        let price = self.candidate_price(belief, state, is_producer, rng);

        if is_producer {
            let quantity = self.inventory(commodity);
            if quantity == 0 {
                return None;
            }
            debug!(agent_id = %self.id, %commodity, price, quantity, "ask decided");
            return Some(Order::ask(self.id.clone(), commodity, price, quantity));
        }

        if self.wealth < price {
            return None;
        }
        let quantity = self.bid_quantity(price);
        debug!(agent_id = %self.id, %commodity, price, quantity, "bid decided");
        Some(Order::bid(self.id.clone(), commodity, price, quantity))
    }

    fn candidate_price<R: Rng>(
        &self,
        belief: &PriceBelief,
        state: &MarketState,
        is_seller: bool,
        rng: &mut R,
    ) -> f64 {
        let draw: f64 = rng.gen_range(0.0..=1.0);
        let risk = self.personality.risk_tolerance;

        // exponent < 1 pushes the draw up, > 1 pulls it down
        let skewed = if is_seller {
            draw.powf(1.0 - 0.5 * risk)
        } else {
            draw.powf(1.0 + risk)
        };

        let mut price = belief.min + skewed * belief.width();
        price *= 1.0 + self.personality.social_influence * state.trend;

        if state.last_price > 0.0 {
            let pull = self.personality.impatience_factor * limits::IMPATIENCE_PULL;
            price += pull * (state.last_price - price);
        }

        price.max(0.0)
    }

    fn bid_quantity(&self, price: f64) -> u32 {
        let cap = self.tuning.max_bid_quantity.max(1);
        if price <= 0.0 {
            return 1;
        }
        let affordable = (self.wealth / price).floor();
        let scaled = (self.wealth / (price * 10.0)).floor().clamp(1.0, cap as f64);
        scaled.min(affordable).max(1.0) as u32
    }

    /// Adapt the belief for `commodity` to a clearing outcome.
    ///
    /// On success the interval is re-centred on `clearing_price` and
    /// narrowed by `learning_rate * convergence`, and the
    /// realized `quantity`/`proceeds` are applied: a seller loses inventory
    /// and receives positive proceeds, a buyer gains inventory and pays
    /// (negative proceeds). On failure the interval widens, downward for a
    /// seller and upward for a buyer.
    pub fn update_belief(
        &mut self,
        commodity: Commodity,
        success: bool,
        clearing_price: f64,
        is_seller: bool,
        quantity: u32,
        proceeds: f64,
    ) {
        if quantity > 0 || proceeds != 0.0 {
            self.apply_trade(commodity, is_seller, quantity, proceeds);
        }

        let learning_rate = self.personality.learning_rate;
        let tuning = self.tuning;
        let Some(belief) = self.price_beliefs.get_mut(&commodity) else {
            return;
        };

        if success && clearing_price.is_finite() && clearing_price >= 0.0 {
            belief.converge(clearing_price, learning_rate * tuning.convergence);
        } else if !success {
            belief.expand(tuning.expansion * (1.0 + learning_rate), is_seller);
        }
    }

    fn apply_trade(&mut self, commodity: Commodity, is_seller: bool, quantity: u32, proceeds: f64) {
        if proceeds.is_finite() {
            let wealth = self.wealth + proceeds;
            if wealth < 0.0 {
                debug!(agent_id = %self.id, wealth, "wealth floored at zero");
            }
            self.wealth = wealth.max(0.0);
        }

        let held = self.inventory.entry(commodity).or_insert(0);
        *held = if is_seller {
            held.saturating_sub(quantity)
        } else {
            held.saturating_add(quantity)
        };
    }
}
