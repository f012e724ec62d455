use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::EngineError;
use crate::execution::OrderSubmitter;
use crate::lock;
use crate::models::{Candidate, EntrySignal, OrderReceipt, OrderSide, OrderSizing};
use crate::risk::{EntryLimits, EntryState, PositionSizer};

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Filled(OrderReceipt),
    /// Refused before any order was sent
    Rejected(String),
    /// The order collaborator failed
    Failed(String),
}

impl ExecutionOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, ExecutionOutcome::Filled(_))
    }
}

/// Marks instruments as in flight until dropped
struct InFlightClaim<'a> {
    registry: &'a Mutex<HashSet<String>>,
    instruments: Vec<String>,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        let mut registry = lock(self.registry);
        for instrument in &self.instruments {
            registry.remove(instrument);
        }
    }
}

/// Turns entry signals into orders
///
/// At most one execution per instrument is in flight at any time; a
/// duplicate request is rejected without touching the order collaborator.
pub struct ExecutionCoordinator {
    orders: Arc<dyn OrderSubmitter>,
    sizer: PositionSizer,
    limits: EntryLimits,
    entry_state: Mutex<EntryState>,
    in_flight: Mutex<HashSet<String>>,
}

impl ExecutionCoordinator {
    pub fn new(orders: Arc<dyn OrderSubmitter>, sizer: PositionSizer, limits: EntryLimits) -> Self {
        Self {
            orders,
            sizer,
            limits,
            entry_state: Mutex::new(EntryState::new(Utc::now().date_naive())),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_in_flight(&self, instrument: &str) -> bool {
        lock(&self.in_flight).contains(instrument)
    }

    pub fn entries_today(&self) -> u32 {
        lock(&self.entry_state).entries_today
    }

    /// Claim every instrument or none of them
    fn claim(&self, instruments: &[&str]) -> Result<InFlightClaim<'_>, EngineError> {
        let mut registry = lock(&self.in_flight);
        if let Some(busy) = instruments.iter().find(|i| registry.contains(**i)) {
            return Err(EngineError::AlreadyInFlight(busy.to_string()));
        }

        for instrument in instruments {
            registry.insert(instrument.to_string());
        }

        Ok(InFlightClaim {
            registry: &self.in_flight,
            instruments: instruments.iter().map(|i| i.to_string()).collect(),
        })
    }

    /// Open a position for the signalled instrument
    pub async fn execute(&self, signal: &EntrySignal) -> ExecutionOutcome {
        let _claim = match self.claim(&[signal.instrument.as_str()]) {
            Ok(claim) => claim,
            Err(e) => {
                tracing::warn!(instrument = %signal.instrument, "Skipping entry: {}", e);
                return ExecutionOutcome::Rejected(e.to_string());
            }
        };

        tracing::info!(
            instrument = %signal.instrument,
            reason = ?signal.reason,
            "Executing entry signal"
        );
        self.enter(&signal.instrument).await
    }

    /// Sell `exit` in full, then buy `enter`
    ///
    /// Runs strictly in sequence. If the exit fails nothing is bought.
    pub async fn exit_and_enter(&self, exit: &str, enter: &Candidate) -> ExecutionOutcome {
        if exit == enter.instrument {
            return ExecutionOutcome::Rejected(format!("cannot replace {} with itself", exit));
        }

        let _claim = match self.claim(&[exit, enter.instrument.as_str()]) {
            Ok(claim) => claim,
            Err(e) => {
                tracing::warn!("Skipping replacement {} -> {}: {}", exit, enter.instrument, e);
                return ExecutionOutcome::Rejected(e.to_string());
            }
        };

        // Do not sell if the entry would be refused anyway
        {
            let mut state = lock(&self.entry_state);
            state.roll(Utc::now().date_naive());
            if let Err(trip) = self.limits.check(&state, None) {
                return ExecutionOutcome::Rejected(format!("Risk limit: {:?}", trip));
            }
        }

        match self
            .orders
            .submit(exit, OrderSide::Sell, OrderSizing::EntirePosition)
            .await
        {
            Ok(receipt) => {
                tracing::info!(
                    "🔴 SELL {} for replacement (order {})",
                    exit,
                    receipt.order_id
                );
            }
            Err(e) => {
                tracing::warn!("✗ Exit of {} failed, keeping position: {:#}", exit, e);
                return ExecutionOutcome::Failed(format!("exit of {} failed: {:#}", exit, e));
            }
        }

        let outcome = self.enter(&enter.instrument).await;
        if !outcome.is_filled() {
            tracing::error!(
                "Exited {} but entry into {} did not complete: {:?}",
                exit,
                enter.instrument,
                outcome
            );
        }
        outcome
    }

    /// Size and submit a buy; the caller holds the claim
    async fn enter(&self, instrument: &str) -> ExecutionOutcome {
        let balance = match self.orders.available_balance().await {
            Ok(balance) => Some(balance),
            Err(e) => {
                tracing::warn!("Balance unavailable, using fallback stake: {:#}", e);
                None
            }
        };

        let today = Utc::now().date_naive();
        {
            let mut state = lock(&self.entry_state);
            state.roll(today);
            if let Err(trip) = self.limits.check(&state, balance) {
                tracing::warn!(instrument = %instrument, "Entry blocked: {:?}", trip);
                return ExecutionOutcome::Rejected(format!("Risk limit: {:?}", trip));
            }
        }

        let stake = match self.sizer.stake(balance) {
            Ok(stake) => stake,
            Err(e) => return ExecutionOutcome::Failed(e.to_string()),
        };

        match self
            .orders
            .submit(instrument, OrderSide::Buy, OrderSizing::Quote(stake))
            .await
        {
            Ok(receipt) => {
                lock(&self.entry_state).record_entry(today);
                tracing::info!(
                    "💰 BUY {} for {:.0} (order {})",
                    instrument,
                    stake,
                    receipt.order_id
                );
                ExecutionOutcome::Filled(receipt)
            }
            Err(e) => {
                tracing::warn!("✗ Entry into {} failed: {:#}", instrument, e);
                ExecutionOutcome::Failed(format!("{:#}", e))
            }
        }
    }
}
