use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Guards applied before opening a new position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryLimits {
    pub max_daily_entries: u32,
    pub min_balance: f64,
}

impl Default for EntryLimits {
    fn default() -> Self {
        Self {
            max_daily_entries: 20, // Max 20 entries per UTC day
            min_balance: 10_000.0, // Keep at least this much quote currency
        }
    }
}

/// Per-day entry bookkeeping
#[derive(Debug, Clone)]
pub struct EntryState {
    pub entries_today: u32,
    pub day: NaiveDate,
}

impl EntryState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            entries_today: 0,
            day: today,
        }
    }

    /// Reset the counter when the day changes
    pub fn roll(&mut self, today: NaiveDate) {
        if today != self.day {
            tracing::info!("📅 New trading day {}, resetting entry counter", today);
            self.entries_today = 0;
            self.day = today;
        }
    }

    pub fn record_entry(&mut self, today: NaiveDate) {
        self.roll(today);
        self.entries_today += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LimitTrip {
    DailyEntryLimit,
    BelowMinBalance,
}

impl EntryLimits {
    /// Check whether another entry is allowed
    ///
    /// The balance check only applies when the balance is known.
    pub fn check(&self, state: &EntryState, balance: Option<f64>) -> Result<(), LimitTrip> {
        if state.entries_today >= self.max_daily_entries {
            return Err(LimitTrip::DailyEntryLimit);
        }

        if let Some(balance) = balance {
            if balance < self.min_balance {
                return Err(LimitTrip::BelowMinBalance);
            }
        }

        Ok(())
    }
}
