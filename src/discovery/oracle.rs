use crate::lock;
use crate::models::{ScanResult, TimingAssessment};
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;

/// Assigns a timing category and signal strength to a scanned instrument
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn assess(&self, scan: &ScanResult) -> anyhow::Result<TimingAssessment>;
}

/// Oracle backed by a fixed table, e.g. loaded from a scan file
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    assessments: HashMap<String, TimingAssessment>,
}

impl StaticOracle {
    pub fn new(assessments: HashMap<String, TimingAssessment>) -> Self {
        Self { assessments }
    }

    pub fn insert(&mut self, instrument: impl Into<String>, assessment: TimingAssessment) {
        self.assessments.insert(instrument.into(), assessment);
    }
}

#[async_trait]
impl ScoringOracle for StaticOracle {
    async fn assess(&self, scan: &ScanResult) -> anyhow::Result<TimingAssessment> {
        self.assessments
            .get(&scan.instrument)
            .cloned()
            .with_context(|| format!("no assessment for {}", scan.instrument))
    }
}

/// Wraps an oracle with a per-call timeout and a last-known-good cache
///
/// When a fresh assessment fails or times out, the assessment from the
/// last successful cycle for that instrument is used. Instruments with
/// neither are left out of the cycle.
pub struct CachedOracle {
    inner: Arc<dyn ScoringOracle>,
    timeout: Duration,
    last_good: Mutex<HashMap<String, TimingAssessment>>,
}

impl CachedOracle {
    pub fn new(inner: Arc<dyn ScoringOracle>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            last_good: Mutex::new(HashMap::new()),
        }
    }

    /// Assess every scan result concurrently, preserving scan order
    pub async fn assess_all(&self, scans: &[ScanResult]) -> Vec<(ScanResult, TimingAssessment)> {
        let mut tasks = JoinSet::new();
        for (idx, scan) in scans.iter().cloned().enumerate() {
            let oracle = self.inner.clone();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let outcome = tokio::time::timeout(timeout, oracle.assess(&scan)).await;
                (idx, outcome)
            });
        }

        let mut fresh: HashMap<usize, anyhow::Result<TimingAssessment>> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(result))) => {
                    fresh.insert(idx, result);
                }
                Ok((idx, Err(_elapsed))) => {
                    fresh.insert(
                        idx,
                        Err(anyhow::anyhow!("assessment timed out after {:?}", self.timeout)),
                    );
                }
                Err(e) => tracing::warn!("Oracle task failed: {}", e),
            }
        }

        let mut last_good = lock(&self.last_good);

        let mut assessed = Vec::with_capacity(scans.len());
        for (idx, scan) in scans.iter().enumerate() {
            let result = fresh
                .remove(&idx)
                .unwrap_or_else(|| Err(anyhow::anyhow!("assessment task did not complete")));

            match result {
                Ok(assessment) => {
                    last_good.insert(scan.instrument.clone(), assessment.clone());
                    assessed.push((scan.clone(), assessment));
                }
                Err(e) => match last_good.get(&scan.instrument) {
                    Some(cached) => {
                        tracing::warn!(
                            instrument = %scan.instrument,
                            "Oracle unavailable, reusing last assessment: {:#}",
                            e
                        );
                        assessed.push((scan.clone(), cached.clone()));
                    }
                    None => {
                        tracing::warn!(
                            instrument = %scan.instrument,
                            "Oracle unavailable, skipping this cycle: {:#}",
                            e
                        );
                    }
                },
            }
        }

        assessed
    }
}
