pub mod limits;
pub mod sizing;

pub use limits::{EntryLimits, EntryState, LimitTrip};
pub use sizing::PositionSizer;
