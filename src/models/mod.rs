use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Raw scanner output for one instrument
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanResult {
    pub instrument: String,
    pub score: f64,
    pub effective_score: f64, // score adjusted for liquidity/exposure, the ranking key
}

/// When the scoring oracle thinks an entry should happen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimingCategory {
    Now,
    Watch,
    Wait,
}

/// Oracle conviction attached to a timing category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    Strong,
    Medium,
    Weak,
    None,
}

impl SignalStrength {
    /// Numeric rank, higher is stronger
    pub fn rank(self) -> u8 {
        match self {
            SignalStrength::Strong => 3,
            SignalStrength::Medium => 2,
            SignalStrength::Weak => 1,
            SignalStrength::None => 0,
        }
    }

    pub fn at_least(self, floor: SignalStrength) -> bool {
        self.rank() >= floor.rank()
    }
}

/// Trading posture, fixed for the whole run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskProfile {
    HighRisk,
    #[default]
    LowRisk,
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskProfile::HighRisk => write!(f, "high-risk"),
            RiskProfile::LowRisk => write!(f, "low-risk"),
        }
    }
}

/// Oracle verdict for a single scan result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingAssessment {
    pub timing: TimingCategory,
    pub strength: SignalStrength,
    #[serde(default)]
    pub reason: String,
}

/// A scored, timed instrument eligible for the shortlist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub instrument: String,
    pub score: f64,
    pub effective_score: f64,
    pub timing: TimingCategory,
    pub strength: SignalStrength,
    pub timing_reason: String,
    pub risk_profile: RiskProfile,
}

impl Candidate {
    pub fn from_assessment(
        scan: &ScanResult,
        assessment: &TimingAssessment,
        risk_profile: RiskProfile,
    ) -> Self {
        Self {
            instrument: scan.instrument.clone(),
            score: scan.score,
            effective_score: scan.effective_score,
            timing: assessment.timing,
            strength: assessment.strength,
            timing_reason: assessment.reason.clone(),
            risk_profile,
        }
    }
}

/// A single observed price
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryReason {
    ImmediateNow,
    WatchTimeout,
    WatchPriceMove,
    WaitOpportunity,
}

/// Request to open a position in one instrument
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntrySignal {
    pub instrument: String,
    pub reason: EntryReason,
    pub generated_at: DateTime<Utc>,
}

/// Externally owned view of a held position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenPosition {
    pub instrument: String,
    pub unrealized_return_pct: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// How much to trade
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum OrderSizing {
    /// Spend this much quote currency
    Quote(f64),
    /// Liquidate whatever is held
    EntirePosition,
}

/// Acknowledgement returned by an order submitter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderReceipt {
    pub order_id: Uuid,
    pub instrument: String,
    pub side: OrderSide,
    pub price: Option<f64>,
    pub quantity: Option<f64>,
    pub submitted_at: DateTime<Utc>,
}

/// Per-instrument row of the monitoring snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentStatus {
    pub instrument: String,
    pub timing: TimingCategory,
    pub strength: SignalStrength,
    pub risk_profile: RiskProfile,
    pub registered_at: DateTime<Utc>,
    pub samples: usize,
    pub last_price: Option<f64>,
}

/// Read-only view of the monitor, for display and telemetry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitoringStatus {
    pub tracked_count: usize,
    pub instruments: Vec<InstrumentStatus>,
    pub pending_signals: BTreeMap<String, EntryReason>,
}
