use crate::models::{
    Candidate, EntryReason, EntrySignal, PriceSample, RiskProfile, SignalStrength, TimingCategory,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Slack for percentage comparisons so 0.5% really means 0.5%
const PCT_EPSILON: f64 = 1e-9;

/// Samples the Wait rule looks back over for the recent local high
const WAIT_LOOKBACK_SAMPLES: usize = 5;

/// Entry thresholds for one risk profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingThresholds {
    pub watch_timeout_mins: i64,             // Watch entries forced after this long
    pub watch_timeout_strength: SignalStrength, // Weakest strength the timeout applies to
    pub watch_rise_pct: f64,                 // Rise from oldest sample
    pub watch_dip_pct: f64,                  // Drop from oldest sample to window low
    pub watch_rebound_pct: f64,              // Recovery from window low to latest
    pub wait_drop_pct: Option<f64>,          // Drop from recent local high; None disables Wait entries
}

impl TimingThresholds {
    /// Default thresholds for a risk profile
    ///
    /// # Example
    /// ```
    /// use entrybot::models::RiskProfile;
    /// use entrybot::strategy::timing::TimingThresholds;
    ///
    /// let aggressive = TimingThresholds::for_profile(RiskProfile::HighRisk);
    /// assert_eq!(aggressive.watch_timeout_mins, 2);
    /// assert!(TimingThresholds::for_profile(RiskProfile::LowRisk).wait_drop_pct.is_none());
    /// ```
    pub fn for_profile(profile: RiskProfile) -> Self {
        match profile {
            RiskProfile::HighRisk => Self {
                watch_timeout_mins: 2,
                watch_timeout_strength: SignalStrength::Medium,
                watch_rise_pct: 0.5,
                watch_dip_pct: 1.0,
                watch_rebound_pct: 0.5,
                wait_drop_pct: Some(2.0),
            },
            RiskProfile::LowRisk => Self {
                watch_timeout_mins: 5,
                watch_timeout_strength: SignalStrength::Strong,
                watch_rise_pct: 1.5,
                watch_dip_pct: 2.0,
                watch_rebound_pct: 1.0,
                wait_drop_pct: None,
            },
        }
    }
}

/// Everything the classifier looks at for one instrument
#[derive(Debug, Clone, Copy)]
pub struct TimingInput<'a> {
    pub candidate: &'a Candidate,
    pub registered_at: DateTime<Utc>,
    pub history: &'a [PriceSample], // oldest first
    pub has_pending_signal: bool,
}

/// Decides when a tracked instrument should be entered
///
/// Stateless: every decision is a function of the input snapshot and `now`.
#[derive(Debug, Clone)]
pub struct TimingClassifier {
    high_risk: TimingThresholds,
    low_risk: TimingThresholds,
}

impl Default for TimingClassifier {
    fn default() -> Self {
        Self::new(
            TimingThresholds::for_profile(RiskProfile::HighRisk),
            TimingThresholds::for_profile(RiskProfile::LowRisk),
        )
    }
}

impl TimingClassifier {
    pub fn new(high_risk: TimingThresholds, low_risk: TimingThresholds) -> Self {
        Self {
            high_risk,
            low_risk,
        }
    }

    pub fn thresholds(&self, profile: RiskProfile) -> &TimingThresholds {
        match profile {
            RiskProfile::HighRisk => &self.high_risk,
            RiskProfile::LowRisk => &self.low_risk,
        }
    }

    /// Registration-time check for the immediate path
    ///
    /// Only `Now` candidates with Strong or Medium strength enter at once.
    pub fn on_registration(&self, candidate: &Candidate, now: DateTime<Utc>) -> Option<EntrySignal> {
        let qualifies = candidate.timing == TimingCategory::Now
            && candidate.strength.at_least(SignalStrength::Medium);

        qualifies.then(|| signal(candidate, EntryReason::ImmediateNow, now))
    }

    /// Periodic check for Watch and Wait instruments
    pub fn evaluate(&self, input: &TimingInput<'_>, now: DateTime<Utc>) -> Option<EntrySignal> {
        if input.has_pending_signal {
            return None;
        }

        let candidate = input.candidate;
        let thresholds = self.thresholds(candidate.risk_profile);

        match candidate.timing {
            // Decided once at registration
            TimingCategory::Now => None,
            TimingCategory::Watch => {
                if input.history.is_empty() {
                    return None;
                }

                let elapsed = now - input.registered_at;
                if elapsed >= Duration::minutes(thresholds.watch_timeout_mins)
                    && candidate.strength.at_least(thresholds.watch_timeout_strength)
                {
                    return Some(signal(candidate, EntryReason::WatchTimeout, now));
                }

                if watch_price_move(input.history, thresholds) {
                    return Some(signal(candidate, EntryReason::WatchPriceMove, now));
                }

                None
            }
            TimingCategory::Wait => {
                let drop_pct = thresholds.wait_drop_pct?;
                if input.history.len() < 2 {
                    return None;
                }

                let high = recent_high(input.history)?;
                let latest = input.history.last()?.price;
                let drop = -pct_change(high, latest);

                reached(drop, drop_pct).then(|| signal(candidate, EntryReason::WaitOpportunity, now))
            }
        }
    }
}

fn signal(candidate: &Candidate, reason: EntryReason, now: DateTime<Utc>) -> EntrySignal {
    EntrySignal {
        instrument: candidate.instrument.clone(),
        reason,
        generated_at: now,
    }
}

/// Rise from the oldest sample, or a dip to the window low followed by a rebound
fn watch_price_move(history: &[PriceSample], thresholds: &TimingThresholds) -> bool {
    if history.len() < 2 {
        return false;
    }

    let (Some(first), Some(last), Some(low)) = (history.first(), history.last(), window_low(history))
    else {
        return false;
    };

    let rise = pct_change(first.price, last.price);
    if reached(rise, thresholds.watch_rise_pct) {
        return true;
    }

    let dip = -pct_change(first.price, low);
    let rebound = pct_change(low, last.price);
    reached(dip, thresholds.watch_dip_pct) && reached(rebound, thresholds.watch_rebound_pct)
}

fn window_low(history: &[PriceSample]) -> Option<f64> {
    history.iter().map(|s| s.price).min_by(|a, b| a.total_cmp(b))
}

/// Highest price among the last `WAIT_LOOKBACK_SAMPLES` samples
fn recent_high(history: &[PriceSample]) -> Option<f64> {
    let start = history.len().saturating_sub(WAIT_LOOKBACK_SAMPLES);
    history[start..]
        .iter()
        .map(|s| s.price)
        .max_by(|a, b| a.total_cmp(b))
}

fn pct_change(from: f64, to: f64) -> f64 {
    (to - from) / from * 100.0
}

fn reached(value: f64, threshold: f64) -> bool {
    value + PCT_EPSILON >= threshold
}
