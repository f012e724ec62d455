// Entry timing and position replacement decisions
pub mod replacement;
pub mod timing;

pub use replacement::{consider_replacement, ReplacementPlan};
pub use timing::{TimingClassifier, TimingInput, TimingThresholds};
