use serde::{Deserialize, Serialize};

/// Decides how much quote currency to commit to a new entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionSizer {
    pub stake_pct: f64,              // Share of available balance per entry
    pub min_stake: f64,              // Floor for any entry
    pub fallback_stake: Option<f64>, // Used when the balance cannot be read
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self {
            stake_pct: 3.0,
            min_stake: 100.0,
            fallback_stake: Some(10_000.0),
        }
    }
}

impl PositionSizer {
    /// Stake for the next entry
    ///
    /// `balance` is the available quote balance, or `None` when the lookup
    /// failed. Errors only when the balance is unknown and no fallback
    /// stake is configured.
    pub fn stake(&self, balance: Option<f64>) -> anyhow::Result<f64> {
        let stake = match balance {
            Some(balance) => {
                let pct = self.stake_pct.clamp(0.1, 100.0);
                balance * pct / 100.0
            }
            None => self
                .fallback_stake
                .ok_or_else(|| anyhow::anyhow!("Cannot determine stake: balance unavailable"))?,
        };

        Ok(stake.max(self.min_stake))
    }
}
