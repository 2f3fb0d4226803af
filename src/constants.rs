//! Application constants and configuration values.
//!
//! This module centralizes the tunables of the economy simulation and
//! the broker contract so they can be adjusted in one place.

/// Broker topics and event contract
pub mod broker {
    /// Topic carrying world ticks
    pub const TICK_TOPIC: &str = "world.tick.hourly";

    /// Topic receiving market clearing results
    pub const SIMULATION_EVENT_TOPIC: &str = "simulation.event";

    /// Default consumer group
    pub const CONSUMER_GROUP: &str = "economy-service-group";

    /// The only tick type that triggers clearing
    pub const SUPPORTED_TICK_TYPE: &str = "hourly";

    /// Event type of published clearing results
    pub const MARKET_CLEARED_EVENT: &str = "simulation.event.market_cleared";

    /// Pause after a broker read error before the next attempt
    pub const READ_ERROR_BACKOFF_MS: u64 = 100;
}

/// Market clearing constants
pub mod market {
    /// Number of history entries used for volatility
    pub const VOLATILITY_WINDOW: usize = 5;

    /// Number of history entries used for trend
    pub const TREND_WINDOW: usize = 3;

    /// Trend is undefined below this base price
    pub const TREND_MIN_BASE_PRICE: f64 = 0.01;

    /// Trade records are pruned every this many recorded trades
    pub const TRADE_HISTORY_PRUNE_EVERY: usize = 100;

    /// Window for the rolling traded volume, in seconds
    pub const VOLUME_WINDOW_SECS: i64 = 24 * 60 * 60;

    /// Default retention of trade records, in days
    pub const TRADE_RETENTION_DAYS: i64 = 30;

    /// Initial book capacity per side
    pub const BOOK_CAPACITY: usize = 100;
}

/// Agent behaviour constants
pub mod agent {
    /// Fraction of the belief width removed per successful trade at full learning rate
    pub const BELIEF_CONVERGENCE: f64 = 0.5;

    /// Fraction of the belief width added per failed round
    pub const BELIEF_EXPANSION: f64 = 0.1;

    /// Smallest width a belief interval may shrink to
    pub const MIN_BELIEF_WIDTH: f64 = 0.01;

    /// Ceiling on any belief bound
    pub const MAX_BELIEF_PRICE: f64 = 1_000_000.0;

    /// Smallest absolute widening step after a failed round
    pub const MIN_EXPANSION_STEP: f64 = 0.05;

    /// Upper bound on units per bid
    pub const MAX_BID_QUANTITY: u32 = 5;

    /// Share of the gap to the last price closed at full impatience
    pub const IMPATIENCE_PULL: f64 = 0.25;

    /// Starting wealth of the default population
    pub const DEFAULT_WEALTH: f64 = 100.0;

    /// Buyers and sellers created per commodity in the default population
    pub const DEFAULT_AGENTS_PER_SIDE: usize = 5;
}

/// Clearing service constants
pub mod clearing {
    /// Markets matched concurrently
    pub const WORKER_POOL_SIZE: usize = 4;

    /// Commands buffered per market
    pub const QUEUE_DEPTH: usize = 256;

    /// Budget for one full clearing pass, in milliseconds
    pub const TIMEOUT_MS: u64 = 500;
}
