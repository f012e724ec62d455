// Scan ingestion, oracle assessment and shortlist selection
pub mod oracle;
pub mod scan_schedule;
pub mod selector;
pub mod validation;

pub use oracle::{CachedOracle, ScoringOracle, StaticOracle};
pub use scan_schedule::AdaptiveScanSchedule;
pub use selector::{rank, select, Ranked, Shortlist, DEFAULT_SHORTLIST_SIZE};
pub use validation::{is_valid_scan, sanitize_scan};
