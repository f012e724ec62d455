// Order execution and price collection
pub mod broker;
pub mod coordinator;
pub mod paper;
pub mod price_feed;
pub mod price_history;

pub use broker::{OrderSubmitter, PositionSource};
pub use coordinator::{ExecutionCoordinator, ExecutionOutcome};
pub use paper::{PaperBroker, PaperPosition};
pub use price_feed::{PriceFeed, PriceLookup, DEFAULT_LOOKUP_TIMEOUT};
pub use price_history::{PriceHistory, DEFAULT_HISTORY_CAPACITY};
