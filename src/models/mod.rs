// Data models shared by the agents, markets and the tick consumer

pub mod commodity;
pub mod market_state;
pub mod order;
pub mod tick;
pub mod trade;

pub use commodity::Commodity;
pub use market_state::MarketState;
pub use order::{Order, OrderType};
pub use tick::{TickData, TickEvent};
pub use trade::{ClearingSummary, MarketClearedEvent, MarketResult, Trade};
