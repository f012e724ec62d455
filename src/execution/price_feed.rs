use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Upper bound on a single price lookup
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Current-price source for a single instrument
#[async_trait]
pub trait PriceLookup: Send + Sync {
    async fn lookup(&self, instrument: &str) -> anyhow::Result<f64>;
}

/// Fans price lookups out across instruments
///
/// Each lookup runs as its own task under `lookup_timeout`, so one slow or
/// failing instrument never holds up the others.
#[derive(Clone)]
pub struct PriceFeed {
    source: Arc<dyn PriceLookup>,
    lookup_timeout: Duration,
}

impl PriceFeed {
    pub fn new(source: Arc<dyn PriceLookup>, lookup_timeout: Duration) -> Self {
        Self {
            source,
            lookup_timeout,
        }
    }

    /// Start one lookup task per instrument
    ///
    /// Results come back from `join_next` in completion order. A lookup that
    /// outlives the timeout resolves to an error for its instrument only.
    pub fn spawn_all(&self, instruments: &[String]) -> JoinSet<(String, anyhow::Result<f64>)> {
        let mut tasks = JoinSet::new();
        for instrument in instruments.iter().cloned() {
            let source = self.source.clone();
            let limit = self.lookup_timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(limit, source.lookup(&instrument)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("price lookup timed out after {:?}", limit)),
                };
                match &result {
                    Ok(price) => tracing::debug!("  ✓ {} @ {:.4}", instrument, price),
                    Err(e) => tracing::warn!("  ✗ {} price unavailable: {:#}", instrument, e),
                }
                (instrument, result)
            });
        }
        tasks
    }
}
