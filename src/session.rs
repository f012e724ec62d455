use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::discovery::{sanitize_scan, select, CachedOracle, ScoringOracle, Shortlist};
use crate::execution::{
    ExecutionCoordinator, ExecutionOutcome, PaperBroker, PositionSource, PriceLookup,
};
use crate::lock;
use crate::models::{Candidate, EntrySignal, MonitoringStatus, RiskProfile, ScanResult};
use crate::monitor::DynamicMonitor;
use crate::strategy::consider_replacement;

/// Summary of one selection cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub received: usize,
    pub valid: usize,
    pub assessed: usize,
    pub shortlist: Vec<String>,
    pub executions: Vec<(EntrySignal, ExecutionOutcome)>,
    /// Set when positions could not be read and tracking was left as is
    pub skipped: bool,
}

/// Wires scan ingestion, selection, monitoring and replacement together
///
/// Owns the current shortlist. Instruments already held are never handed to
/// the monitor; those entered through replacement are additionally carried
/// until a positions snapshot no longer lists them.
pub struct TradingSession {
    oracle: CachedOracle,
    monitor: Arc<DynamicMonitor>,
    coordinator: Arc<ExecutionCoordinator>,
    positions: Arc<dyn PositionSource>,
    risk_profile: RiskProfile,
    shortlist: Mutex<Shortlist>,
    carried: Mutex<HashSet<String>>,
}

impl TradingSession {
    pub fn new(
        oracle: CachedOracle,
        monitor: Arc<DynamicMonitor>,
        coordinator: Arc<ExecutionCoordinator>,
        positions: Arc<dyn PositionSource>,
        risk_profile: RiskProfile,
        shortlist_size: usize,
    ) -> Self {
        Self {
            oracle,
            monitor,
            coordinator,
            positions,
            risk_profile,
            shortlist: Mutex::new(Shortlist::empty(shortlist_size)),
            carried: Mutex::new(HashSet::new()),
        }
    }

    /// Paper-trading session built from config
    pub fn paper(
        cfg: &AppConfig,
        oracle: Arc<dyn ScoringOracle>,
        prices: Arc<dyn PriceLookup>,
    ) -> (Self, Arc<PaperBroker>) {
        let broker = Arc::new(PaperBroker::new(cfg.execution.initial_cash, prices.clone()));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            broker.clone(),
            cfg.execution.sizing.clone(),
            cfg.execution.limits.clone(),
        ));
        let monitor = Arc::new(DynamicMonitor::new(
            cfg.classifier(),
            prices,
            coordinator.clone(),
            cfg.monitor_settings(),
        ));

        let session = Self::new(
            CachedOracle::new(oracle, cfg.oracle_timeout()),
            monitor,
            coordinator,
            broker.clone(),
            cfg.monitor.risk_profile,
            cfg.monitor.shortlist_size,
        );
        (session, broker)
    }

    pub fn monitor(&self) -> &Arc<DynamicMonitor> {
        &self.monitor
    }

    pub fn coordinator(&self) -> &Arc<ExecutionCoordinator> {
        &self.coordinator
    }

    pub fn risk_profile(&self) -> RiskProfile {
        self.risk_profile
    }

    pub fn shortlist(&self) -> Shortlist {
        lock(&self.shortlist).clone()
    }

    pub fn carried(&self) -> Vec<String> {
        let mut carried: Vec<String> = lock(&self.carried).iter().cloned().collect();
        carried.sort();
        carried
    }

    pub fn status(&self) -> MonitoringStatus {
        self.monitor.status()
    }

    /// Validate, assess and rank a scan, then hand the shortlist to the monitor
    pub async fn on_scan(&self, scans: Vec<ScanResult>, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport {
            received: scans.len(),
            ..Default::default()
        };

        let valid = sanitize_scan(scans);
        report.valid = valid.len();

        let assessed = self.oracle.assess_all(&valid).await;
        report.assessed = assessed.len();

        let Some(held) = self.held_instruments().await else {
            report.skipped = true;
            report.shortlist = lock(&self.shortlist).instruments();
            return report;
        };

        let candidates: Vec<Candidate> = assessed
            .iter()
            .map(|(scan, assessment)| Candidate::from_assessment(scan, assessment, self.risk_profile))
            .filter(|c| !held.contains(&c.instrument))
            .collect();

        let capacity = lock(&self.shortlist).capacity();
        let shortlist = select(&candidates, capacity);
        report.shortlist = shortlist.instruments();

        tracing::info!(
            "📋 Shortlist: {} of {} candidates ({} held, {} rejected)",
            shortlist.len(),
            candidates.len(),
            held.len(),
            report.received - report.valid
        );

        *lock(&self.shortlist) = shortlist.clone();
        report.executions = self.monitor.update_shortlist(&shortlist, now).await;
        report
    }

    /// Try to rotate a newly scored candidate into the book
    ///
    /// Returns `None` when no replacement was attempted.
    pub async fn offer_candidate(&self, candidate: Candidate) -> Option<ExecutionOutcome> {
        if !lock(&self.shortlist).admits(&candidate) {
            return None;
        }

        let positions = match self.positions.open_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                tracing::warn!(
                    instrument = %candidate.instrument,
                    "Positions unavailable, skipping replacement: {:#}",
                    e
                );
                return None;
            }
        };

        let plan = consider_replacement(&candidate, &positions)?;
        tracing::info!(
            "🔄 Replacing {} ({:+.2}%) with {} (score {:.3})",
            plan.exit.instrument,
            plan.exit.unrealized_return_pct,
            plan.enter.instrument,
            plan.enter.effective_score
        );

        let outcome = self
            .coordinator
            .exit_and_enter(&plan.exit.instrument, &plan.enter)
            .await;

        if outcome.is_filled() {
            let displaced = lock(&self.shortlist).swap(&plan.exit.instrument, plan.enter.clone());
            self.monitor.forget(&plan.exit.instrument);
            self.monitor.forget(&plan.enter.instrument);
            // Without a matching member, swap evicts the lowest ranked one
            if let Some(displaced) = displaced {
                self.monitor.forget(&displaced.instrument);
            }

            let mut carried = lock(&self.carried);
            carried.remove(&plan.exit.instrument);
            carried.insert(plan.enter.instrument.clone());
        }

        Some(outcome)
    }

    /// Held plus carried instruments, or `None` if positions are unreadable
    async fn held_instruments(&self) -> Option<HashSet<String>> {
        let positions = match self.positions.open_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                tracing::warn!("Positions unavailable, keeping current tracking: {:#}", e);
                return None;
            }
        };

        let held: HashSet<String> = positions.into_iter().map(|p| p.instrument).collect();

        let mut carried = lock(&self.carried);
        carried.retain(|instrument| {
            let still_held = held.contains(instrument);
            if !still_held {
                tracing::info!(instrument = %instrument, "Carried position closed");
            }
            still_held
        });

        Some(held.union(&carried).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::StaticOracle;
    use crate::execution::OrderSubmitter;
    use crate::models::{
        OrderSide, OrderSizing, SignalStrength, TimingAssessment, TimingCategory,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FixedPrices(Mutex<HashMap<String, f64>>);

    impl FixedPrices {
        fn set(&self, instrument: &str, price: f64) {
            self.0.lock().unwrap().insert(instrument.to_string(), price);
        }
    }

    #[async_trait]
    impl PriceLookup for FixedPrices {
        async fn lookup(&self, instrument: &str) -> anyhow::Result<f64> {
            self.0
                .lock()
                .unwrap()
                .get(instrument)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("no price for {}", instrument))
        }
    }

    fn create_test_scan(instrument: &str, effective_score: f64) -> ScanResult {
        ScanResult {
            instrument: instrument.to_string(),
            score: effective_score,
            effective_score,
        }
    }

    fn assessment(timing: TimingCategory, strength: SignalStrength) -> TimingAssessment {
        TimingAssessment {
            timing,
            strength,
            reason: "test".to_string(),
        }
    }

    fn create_test_session(
        table: StaticOracle,
        shortlist_size: usize,
    ) -> (TradingSession, Arc<PaperBroker>, Arc<FixedPrices>) {
        let mut cfg = AppConfig::default();
        cfg.monitor.shortlist_size = shortlist_size;
        cfg.monitor.risk_profile = RiskProfile::HighRisk;

        let prices = Arc::new(FixedPrices::default());
        let (session, broker) = TradingSession::paper(&cfg, Arc::new(table), prices.clone());
        (session, broker, prices)
    }

    #[tokio::test]
    async fn test_on_scan_selects_and_tracks() {
        let mut table = StaticOracle::default();
        for id in ["KRW-A", "KRW-B", "KRW-C"] {
            table.insert(id, assessment(TimingCategory::Watch, SignalStrength::Weak));
        }
        let (session, _, _) = create_test_session(table, 2);

        let report = session
            .on_scan(
                vec![
                    create_test_scan("KRW-A", 0.5),
                    create_test_scan("KRW-B", 0.9),
                    create_test_scan("KRW-C", 0.7),
                    create_test_scan("", 0.99),
                ],
                Utc::now(),
            )
            .await;

        assert_eq!(report.received, 4);
        assert_eq!(report.valid, 3);
        assert_eq!(report.shortlist, vec!["KRW-B", "KRW-C"]);
        assert_eq!(session.monitor().tracked_instruments(), vec!["KRW-B", "KRW-C"]);
        assert_eq!(session.shortlist().candidates()[0].risk_profile, RiskProfile::HighRisk);
    }

    #[tokio::test]
    async fn test_held_instrument_not_reentered() {
        let mut table = StaticOracle::default();
        table.insert("KRW-A", assessment(TimingCategory::Now, SignalStrength::Strong));
        let (session, broker, prices) = create_test_session(table, 3);
        prices.set("KRW-A", 100.0);

        let scans = vec![create_test_scan("KRW-A", 0.8)];
        let first = session.on_scan(scans.clone(), Utc::now()).await;
        assert_eq!(first.executions.len(), 1);
        assert!(first.executions[0].1.is_filled());

        let second = session.on_scan(scans, Utc::now()).await;
        assert!(second.executions.is_empty());
        assert!(second.shortlist.is_empty());
        assert_eq!(broker.fills().len(), 1);
    }

    #[tokio::test]
    async fn test_offer_candidate_requires_admission() {
        let mut table = StaticOracle::default();
        table.insert("KRW-A", assessment(TimingCategory::Watch, SignalStrength::Weak));
        let (session, _, _) = create_test_session(table, 2);
        session
            .on_scan(vec![create_test_scan("KRW-A", 0.5)], Utc::now())
            .await;

        // Shortlist not full yet
        let candidate = Candidate::from_assessment(
            &create_test_scan("KRW-Z", 0.99),
            &assessment(TimingCategory::Watch, SignalStrength::Strong),
            RiskProfile::HighRisk,
        );
        assert!(session.offer_candidate(candidate).await.is_none());
    }

    #[tokio::test]
    async fn test_replacement_swaps_and_carries() {
        let mut table = StaticOracle::default();
        table.insert("KRW-A", assessment(TimingCategory::Watch, SignalStrength::Weak));
        table.insert("KRW-B", assessment(TimingCategory::Watch, SignalStrength::Weak));
        table.insert("KRW-NEW", assessment(TimingCategory::Watch, SignalStrength::Strong));
        let (session, broker, prices) = create_test_session(table, 2);

        prices.set("KRW-OLD", 100.0);
        prices.set("KRW-NEW", 50.0);
        broker
            .submit("KRW-OLD", OrderSide::Buy, OrderSizing::Quote(10_000.0))
            .await
            .unwrap();
        prices.set("KRW-OLD", 90.0);

        session
            .on_scan(
                vec![create_test_scan("KRW-A", 0.5), create_test_scan("KRW-B", 0.6)],
                Utc::now(),
            )
            .await;

        let candidate = Candidate::from_assessment(
            &create_test_scan("KRW-NEW", 0.95),
            &assessment(TimingCategory::Watch, SignalStrength::Strong),
            RiskProfile::HighRisk,
        );
        let outcome = session.offer_candidate(candidate).await.unwrap();

        assert!(outcome.is_filled());
        assert!(!broker.has_open_position("KRW-OLD"));
        assert!(broker.has_open_position("KRW-NEW"));
        assert!(session.shortlist().contains("KRW-NEW"));
        assert!(session.monitor().is_tracked("KRW-B"));
        assert!(!session.shortlist().contains("KRW-A"));
        assert!(!session.monitor().is_tracked("KRW-A"));
        assert_eq!(session.carried(), vec!["KRW-NEW"]);
        assert!(!session.monitor().is_tracked("KRW-NEW"));

        // Carried instrument stays out of monitoring on the next cycle
        let report = session
            .on_scan(vec![create_test_scan("KRW-NEW", 0.95)], Utc::now())
            .await;
        assert!(!report.shortlist.contains(&"KRW-NEW".to_string()));
    }

    #[tokio::test]
    async fn test_no_replacement_when_all_positions_profitable() {
        let mut table = StaticOracle::default();
        table.insert("KRW-A", assessment(TimingCategory::Watch, SignalStrength::Weak));
        let (session, broker, prices) = create_test_session(table, 1);

        prices.set("KRW-OLD", 100.0);
        broker
            .submit("KRW-OLD", OrderSide::Buy, OrderSizing::Quote(10_000.0))
            .await
            .unwrap();
        prices.set("KRW-OLD", 101.0);
        session
            .on_scan(vec![create_test_scan("KRW-A", 0.5)], Utc::now())
            .await;

        let candidate = Candidate::from_assessment(
            &create_test_scan("KRW-NEW", 0.95),
            &assessment(TimingCategory::Watch, SignalStrength::Strong),
            RiskProfile::HighRisk,
        );
        assert!(session.offer_candidate(candidate).await.is_none());
        assert!(broker.has_open_position("KRW-OLD"));
    }
}
