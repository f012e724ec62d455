use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::execution::PriceLookup;
use crate::lock;

struct WalkState {
    rng: StdRng,
    prices: HashMap<String, f64>,
}

/// Seeded random-walk price source for paper trading
///
/// Every lookup advances that instrument's walk by one step. Unknown
/// instruments start near `base_price`.
pub struct RandomWalkPrices {
    state: Mutex<WalkState>,
    base_price: f64,
    step_pct: f64,
}

impl RandomWalkPrices {
    /// Create a walk with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(WalkState {
                rng: StdRng::seed_from_u64(seed),
                prices: HashMap::new(),
            }),
            base_price: 1_000.0,
            step_pct: 1.0,
        }
    }

    /// Max move per step in percent (default ±1%)
    pub fn with_step_pct(mut self, step_pct: f64) -> Self {
        self.step_pct = step_pct.abs();
        self
    }

    pub fn set_price(&self, instrument: &str, price: f64) {
        lock(&self.state)
            .prices
            .insert(instrument.to_string(), price);
    }

    /// Last emitted price without stepping
    pub fn current(&self, instrument: &str) -> Option<f64> {
        lock(&self.state).prices.get(instrument).copied()
    }
}

#[async_trait]
impl PriceLookup for RandomWalkPrices {
    async fn lookup(&self, instrument: &str) -> anyhow::Result<f64> {
        let mut state = lock(&self.state);
        let WalkState { rng, prices } = &mut *state;

        let price = match prices.get(instrument).copied() {
            Some(last) => {
                let change = if self.step_pct > 0.0 {
                    rng.gen_range(-self.step_pct..self.step_pct) / 100.0
                } else {
                    0.0
                };
                // Keep the walk strictly positive
                (last * (1.0 + change)).max(self.base_price * 0.01)
            }
            None => self.base_price * rng.gen_range(0.5..1.5),
        };

        prices.insert(instrument.to_string(), price);
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_seed_same_walk() {
        let a = RandomWalkPrices::new(42);
        let b = RandomWalkPrices::new(42);

        for _ in 0..20 {
            let pa = a.lookup("KRW-BTC").await.unwrap();
            let pb = b.lookup("KRW-BTC").await.unwrap();
            assert_eq!(pa, pb);
        }
    }

    #[tokio::test]
    async fn test_steps_bounded_and_positive() {
        let prices = RandomWalkPrices::new(7).with_step_pct(2.0);
        prices.set_price("KRW-ETH", 100.0);

        let mut last = 100.0;
        for _ in 0..200 {
            let next = prices.lookup("KRW-ETH").await.unwrap();
            assert!(next > 0.0);
            assert!(((next - last) / last).abs() <= 0.02 + 1e-12 || next == 10.0);
            last = next;
        }
        assert_eq!(prices.current("KRW-ETH"), Some(last));
    }

    #[tokio::test]
    async fn test_zero_step_is_flat() {
        let prices = RandomWalkPrices::new(1).with_step_pct(0.0);
        prices.set_price("KRW-XRP", 5.0);

        assert_eq!(prices.lookup("KRW-XRP").await.unwrap(), 5.0);
        assert_eq!(prices.lookup("KRW-XRP").await.unwrap(), 5.0);
    }
}
