// Tracked-instrument state machine and its periodic driver
mod scheduler;

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::discovery::Shortlist;
use crate::execution::{
    ExecutionCoordinator, ExecutionOutcome, PriceFeed, PriceHistory, PriceLookup,
    DEFAULT_HISTORY_CAPACITY, DEFAULT_LOOKUP_TIMEOUT,
};
use crate::lock;
use crate::models::{
    Candidate, EntrySignal, InstrumentStatus, MonitoringStatus, PriceSample, TimingCategory,
};
use crate::strategy::{TimingClassifier, TimingInput};

use scheduler::SchedulerHandle;

enum Observation {
    Skipped,
    Rejected,
    Evaluated(Option<EntrySignal>),
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub check_interval: Duration,
    pub history_capacity: usize,
    pub lookup_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

/// One shortlist member under active tracking
#[derive(Debug, Clone)]
pub struct MonitoredInstrument {
    pub candidate: Candidate,
    pub history: PriceHistory,
    pub registered_at: DateTime<Utc>,
    pub pending_signal: Option<EntrySignal>,
}

/// What a single tick did
///
/// `signals` were handed to their own execution tasks; their outcomes are
/// collected with [`DynamicMonitor::settle_executions`].
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub evaluated: usize,
    pub price_failures: usize,
    pub signals: Vec<EntrySignal>,
}

type ExecutionTask = JoinHandle<(EntrySignal, ExecutionOutcome)>;

/// Owns the tracked instruments and decides when each should be entered
///
/// All bookkeeping happens under a single lock. Price lookups and order
/// submission always run with the lock released.
pub struct DynamicMonitor {
    tracked: Mutex<BTreeMap<String, MonitoredInstrument>>,
    classifier: TimingClassifier,
    feed: PriceFeed,
    coordinator: Arc<ExecutionCoordinator>,
    settings: MonitorSettings,
    scheduler: Mutex<Option<SchedulerHandle>>,
    executions: Mutex<Vec<ExecutionTask>>,
}

impl DynamicMonitor {
    pub fn new(
        classifier: TimingClassifier,
        prices: Arc<dyn PriceLookup>,
        coordinator: Arc<ExecutionCoordinator>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            tracked: Mutex::new(BTreeMap::new()),
            classifier,
            feed: PriceFeed::new(prices, settings.lookup_timeout),
            coordinator,
            settings,
            scheduler: Mutex::new(None),
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Start tracking shortlist members that are not tracked yet
    ///
    /// Now candidates with qualifying strength are executed straight away
    /// and forgotten once the attempt completes.
    pub async fn register(
        &self,
        shortlist: &Shortlist,
        now: DateTime<Utc>,
    ) -> Vec<(EntrySignal, ExecutionOutcome)> {
        let immediate = self.apply(shortlist, false, now);
        self.run_immediate(immediate).await
    }

    /// Replace tracked membership with `shortlist`
    ///
    /// Instruments in both sets keep their history and registration time.
    /// Dropped instruments stop being monitored; held positions are left alone.
    pub async fn update_shortlist(
        &self,
        shortlist: &Shortlist,
        now: DateTime<Utc>,
    ) -> Vec<(EntrySignal, ExecutionOutcome)> {
        let immediate = self.apply(shortlist, true, now);
        self.run_immediate(immediate).await
    }

    fn apply(&self, shortlist: &Shortlist, prune: bool, now: DateTime<Utc>) -> Vec<EntrySignal> {
        let mut tracked = lock(&self.tracked);

        if prune {
            let keep: HashSet<String> = shortlist.instruments().into_iter().collect();
            tracked.retain(|instrument, _| {
                let kept = keep.contains(instrument);
                if !kept {
                    tracing::info!(instrument = %instrument, "Dropped from shortlist, no longer monitored");
                }
                kept
            });
        }

        let mut immediate = Vec::new();
        for candidate in shortlist.candidates() {
            if tracked.contains_key(&candidate.instrument) {
                continue;
            }

            let signal = self.classifier.on_registration(candidate, now);
            tracing::info!(
                instrument = %candidate.instrument,
                timing = ?candidate.timing,
                strength = ?candidate.strength,
                "👀 Monitoring {}",
                candidate.timing_reason
            );

            tracked.insert(
                candidate.instrument.clone(),
                MonitoredInstrument {
                    candidate: candidate.clone(),
                    history: PriceHistory::new(
                        candidate.instrument.clone(),
                        self.settings.history_capacity,
                    ),
                    registered_at: now,
                    pending_signal: signal.clone(),
                },
            );

            if let Some(signal) = signal {
                immediate.push(signal);
            }
        }

        immediate
    }

    async fn run_immediate(&self, signals: Vec<EntrySignal>) -> Vec<(EntrySignal, ExecutionOutcome)> {
        let mut results = Vec::with_capacity(signals.len());

        for signal in signals {
            let outcome = self.coordinator.execute(&signal).await;

            lock(&self.tracked).remove(&signal.instrument);
            if !outcome.is_filled() {
                tracing::warn!(
                    instrument = %signal.instrument,
                    "Immediate entry not completed, retrying on next selection cycle: {:?}",
                    outcome
                );
            }

            results.push((signal, outcome));
        }

        results
    }

    /// One re-evaluation pass over Watch and Wait instruments
    ///
    /// Each price is handled as soon as its lookup completes, and each entry
    /// signal is executed on its own task. The tick never waits on an order,
    /// and a stuck lookup costs at most the lookup timeout.
    pub async fn tick(self: &Arc<Self>, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        let due: Vec<String> = lock(&self.tracked)
            .values()
            .filter(|m| m.pending_signal.is_none() && m.candidate.timing != TimingCategory::Now)
            .map(|m| m.candidate.instrument.clone())
            .collect();

        if due.is_empty() {
            return report;
        }

        let mut lookups = self.feed.spawn_all(&due);
        while let Some(joined) = lookups.join_next().await {
            let (instrument, price) = match joined {
                Ok((instrument, Ok(price))) => (instrument, price),
                Ok((_, Err(_))) => {
                    report.price_failures += 1;
                    continue;
                }
                Err(e) => {
                    tracing::error!("Price lookup task failed: {}", e);
                    report.price_failures += 1;
                    continue;
                }
            };

            match self.observe(&instrument, price, now) {
                Observation::Skipped => {}
                Observation::Rejected => report.price_failures += 1,
                Observation::Evaluated(signal) => {
                    report.evaluated += 1;
                    if let Some(signal) = signal {
                        self.spawn_execution(signal.clone());
                        report.signals.push(signal);
                    }
                }
            }
        }

        report
    }

    /// Record one sample and classify, claiming the instrument on a signal
    fn observe(&self, instrument: &str, price: f64, now: DateTime<Utc>) -> Observation {
        let mut tracked = lock(&self.tracked);

        // Dropped or claimed while the lock was released
        let Some(monitored) = tracked.get_mut(instrument) else {
            return Observation::Skipped;
        };
        if monitored.pending_signal.is_some() {
            return Observation::Skipped;
        }

        if let Err(e) = monitored.history.push(PriceSample {
            timestamp: now,
            price,
        }) {
            tracing::warn!("Discarding sample: {}", e);
            return Observation::Rejected;
        }

        let samples = monitored.history.samples();
        let signal = self.classifier.evaluate(
            &TimingInput {
                candidate: &monitored.candidate,
                registered_at: monitored.registered_at,
                history: &samples,
                has_pending_signal: false,
            },
            now,
        );

        if let Some(signal) = &signal {
            tracing::info!(
                instrument = %instrument,
                reason = ?signal.reason,
                "🎯 Entry signal raised"
            );
            monitored.pending_signal = Some(signal.clone());
        }

        Observation::Evaluated(signal)
    }

    fn spawn_execution(self: &Arc<Self>, signal: EntrySignal) {
        let monitor = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = monitor.coordinator.execute(&signal).await;
            monitor.resolve(&signal, &outcome);
            (signal, outcome)
        });
        lock(&self.executions).push(task);
    }

    /// Filled entries leave tracking; anything else is re-evaluated next tick
    fn resolve(&self, signal: &EntrySignal, outcome: &ExecutionOutcome) {
        let mut tracked = lock(&self.tracked);
        if outcome.is_filled() {
            tracked.remove(&signal.instrument);
        } else if let Some(monitored) = tracked.get_mut(&signal.instrument) {
            if monitored.pending_signal.as_ref() == Some(signal) {
                monitored.pending_signal = None;
            }
        }
    }

    /// Wait for every spawned execution and return the outcomes
    pub async fn settle_executions(&self) -> Vec<(EntrySignal, ExecutionOutcome)> {
        let tasks = std::mem::take(&mut *lock(&self.executions));

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!("Execution task failed: {}", e),
            }
        }
        results
    }

    /// Drop handles of executions that already finished
    pub(crate) fn reap_executions(&self) {
        lock(&self.executions).retain(|task| !task.is_finished());
    }

    pub fn executions_in_progress(&self) -> usize {
        lock(&self.executions)
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Stop tracking one instrument
    pub fn forget(&self, instrument: &str) -> bool {
        lock(&self.tracked).remove(instrument).is_some()
    }

    pub fn is_tracked(&self, instrument: &str) -> bool {
        lock(&self.tracked).contains_key(instrument)
    }

    pub fn tracked_instruments(&self) -> Vec<String> {
        lock(&self.tracked).keys().cloned().collect()
    }

    pub fn status(&self) -> MonitoringStatus {
        let tracked = lock(&self.tracked);

        let instruments = tracked
            .values()
            .map(|m| InstrumentStatus {
                instrument: m.candidate.instrument.clone(),
                timing: m.candidate.timing,
                strength: m.candidate.strength,
                risk_profile: m.candidate.risk_profile,
                registered_at: m.registered_at,
                samples: m.history.len(),
                last_price: m.history.latest().map(|s| s.price),
            })
            .collect();

        let pending_signals = tracked
            .values()
            .filter_map(|m| {
                m.pending_signal
                    .as_ref()
                    .map(|s| (s.instrument.clone(), s.reason))
            })
            .collect();

        MonitoringStatus {
            tracked_count: tracked.len(),
            instruments,
            pending_signals,
        }
    }
}
