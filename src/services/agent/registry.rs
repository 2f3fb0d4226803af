use std::collections::BTreeMap;
use tracing::info;

use super::{BeliefTuning, Personality, TradingAgent};
use crate::constants::agent as defaults;
use crate::error::Result;
use crate::models::Commodity;

/// Agents keyed by id, iterated in id order
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, TradingAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the default buyers and sellers for each commodity
    pub fn with_default_population(commodities: &[Commodity], tuning: BeliefTuning) -> Result<Self> {
        let mut registry = Self::new();
        for &commodity in commodities {
            registry.populate_defaults(commodity, tuning)?;
        }
        info!(
            "👥 Default agent population created: {} agents across {} markets",
            registry.len(),
            commodities.len()
        );
        Ok(registry)
    }

    /// Add five buyers and five sellers for `commodity`.
    ///
    /// Buyer `i` holds wealth 100 and believes in `[5+i, 15+i]`; seller `i`
    /// holds `10+5i` units and believes in `[8+i, 12+i]`.
    pub fn populate_defaults(&mut self, commodity: Commodity, tuning: BeliefTuning) -> Result<()> {
        for i in 0..defaults::DEFAULT_AGENTS_PER_SIDE {
            let step = i as f64;
            let traits = Personality::new(0.3 + 0.1 * step, 0.2 + 0.1 * step, 0.3, 0.4 + 0.1 * step);

            let mut buyer = TradingAgent::new(format!("buyer-{}-{}", commodity, i + 1), defaults::DEFAULT_WEALTH)
                .with_personality(traits)
                .with_tuning(tuning);
            buyer.set_price_belief(commodity, 5.0 + step, 15.0 + step)?;
            self.insert(buyer);

            let mut seller = TradingAgent::new(format!("seller-{}-{}", commodity, i + 1), defaults::DEFAULT_WEALTH)
                .with_personality(traits)
                .with_tuning(tuning)
                .with_inventory(commodity, 10 + 5 * i as u32);
            seller.set_price_belief(commodity, 8.0 + step, 12.0 + step)?;
            self.insert(seller);
        }
        Ok(())
    }

    /// Insert or replace an agent, returning the replaced one
    pub fn insert(&mut self, agent: TradingAgent) -> Option<TradingAgent> {
        self.agents.insert(agent.id.clone(), agent)
    }

    pub fn get(&self, id: &str) -> Option<&TradingAgent> {
        self.agents.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TradingAgent> {
        self.agents.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradingAgent> {
        self.agents.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    /// Total wealth held by all agents
    pub fn total_wealth(&self) -> f64 {
        self.agents.values().map(|a| a.wealth()).sum()
    }

    /// Total units of `commodity` held by all agents
    pub fn total_inventory(&self, commodity: Commodity) -> u64 {
        self.agents.values().map(|a| a.inventory(commodity) as u64).sum()
    }
}
