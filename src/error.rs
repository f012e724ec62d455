use chrono::{DateTime, Utc};
use thiserror::Error;

/// Contract violations raised by the decision core.
///
/// Collaborator failures (price lookups, order submission) are not listed
/// here; they travel as `anyhow::Error` and are absorbed per instrument.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("shortlist holds {len} candidates but capacity is {capacity}")]
    ShortlistOverCapacity { len: usize, capacity: usize },

    #[error("sample for {instrument} at {at} is older than the newest retained sample ({newest})")]
    OutOfOrderSample {
        instrument: String,
        at: DateTime<Utc>,
        newest: DateTime<Utc>,
    },

    #[error("invalid price {price} for {instrument}")]
    InvalidPrice { instrument: String, price: f64 },

    #[error("execution already in flight for {0}")]
    AlreadyInFlight(String),
}
