use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EconomyError;

/// Tradable good. Each variant has exactly one market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commodity {
    Food,
    Wood,
    Metal,
    Weapon,
    Crystal,
}

impl Commodity {
    /// Every commodity, in market processing order
    pub const ALL: [Commodity; 5] = [
        Commodity::Food,
        Commodity::Wood,
        Commodity::Metal,
        Commodity::Weapon,
        Commodity::Crystal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Commodity::Food => "food",
            Commodity::Wood => "wood",
            Commodity::Metal => "metal",
            Commodity::Weapon => "weapon",
            Commodity::Crystal => "crystal",
        }
    }

    /// Identifier used in published market events
    pub fn market_id(&self) -> String {
        format!("market-{}", self.as_str())
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commodity {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "food" => Ok(Commodity::Food),
            "wood" => Ok(Commodity::Wood),
            "metal" => Ok(Commodity::Metal),
            "weapon" => Ok(Commodity::Weapon),
            "crystal" => Ok(Commodity::Crystal),
            other => Err(EconomyError::not_found(&format!("Commodity '{}'", other))),
        }
    }
}
