use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

use crate::constants::agent;
use crate::services::agent::BeliefTuning;

/// Configuration for the trading agent population
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Seed every market with default buyers and sellers (default: true)
    pub default_population: bool,

    /// Share of the belief width removed per successful trade at learning rate 1 (default: 0.5)
    pub belief_convergence: f64,

    /// Share of the belief width added after a failed round (default: 0.1)
    pub belief_expansion: f64,

    /// Maximum units a single bid may ask for (default: 5)
    pub max_bid_quantity: u32,

    /// Fixed RNG seed for reproducible runs (default: none)
    pub rng_seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_population: true,
            belief_convergence: agent::BELIEF_CONVERGENCE,
            belief_expansion: agent::BELIEF_EXPANSION,
            max_bid_quantity: agent::MAX_BID_QUANTITY,
            rng_seed: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(val) = env::var("AGENT_DEFAULT_POPULATION") {
            match val.parse::<bool>() {
                Ok(enabled) => {
                    config.default_population = enabled;
                    info!("Using custom default population flag: {}", enabled);
                }
                Err(_) => warn!("Failed to parse default population flag: {}, using default", val),
            }
        }

        if let Ok(val) = env::var("AGENT_BELIEF_CONVERGENCE") {
            match val.parse::<f64>() {
                Ok(rate) if rate > 0.0 && rate <= 1.0 => {
                    config.belief_convergence = rate;
                    info!("Using custom belief convergence: {}", rate);
                }
                Ok(_) => warn!(
                    "Invalid belief convergence: {}, must be in (0, 1], using default",
                    val
                ),
                Err(_) => warn!("Failed to parse belief convergence: {}, using default", val),
            }
        }

        if let Ok(val) = env::var("AGENT_BELIEF_EXPANSION") {
            match val.parse::<f64>() {
                Ok(rate) if rate > 0.0 && rate <= 1.0 => {
                    config.belief_expansion = rate;
                    info!("Using custom belief expansion: {}", rate);
                }
                Ok(_) => warn!(
                    "Invalid belief expansion: {}, must be in (0, 1], using default",
                    val
                ),
                Err(_) => warn!("Failed to parse belief expansion: {}, using default", val),
            }
        }

        if let Ok(val) = env::var("AGENT_MAX_BID_QUANTITY") {
            match val.parse::<u32>() {
                Ok(quantity) if quantity >= 1 => {
                    config.max_bid_quantity = quantity;
                    info!("Using custom max bid quantity: {}", quantity);
                }
                Ok(_) => warn!("Invalid max bid quantity: {}, must be >= 1, using default", val),
                Err(_) => warn!("Failed to parse max bid quantity: {}, using default", val),
            }
        }

        if let Ok(val) = env::var("AGENT_RNG_SEED") {
            match val.parse::<u64>() {
                Ok(seed) => {
                    config.rng_seed = Some(seed);
                    info!("Using fixed agent RNG seed: {}", seed);
                }
                Err(_) => warn!("Failed to parse agent RNG seed: {}, using entropy", val),
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.belief_convergence > 0.0 && self.belief_convergence <= 1.0) {
            return Err(anyhow!(
                "belief_convergence must be in (0, 1], got {}",
                self.belief_convergence
            ));
        }
        if !(self.belief_expansion > 0.0 && self.belief_expansion <= 1.0) {
            return Err(anyhow!(
                "belief_expansion must be in (0, 1], got {}",
                self.belief_expansion
            ));
        }
        if self.max_bid_quantity == 0 {
            return Err(anyhow!("max_bid_quantity must be at least 1"));
        }
        Ok(())
    }

    pub fn tuning(&self) -> BeliefTuning {
        BeliefTuning {
            convergence: self.belief_convergence,
            expansion: self.belief_expansion,
            max_bid_quantity: self.max_bid_quantity,
        }
    }
}
