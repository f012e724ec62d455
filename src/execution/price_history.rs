use crate::error::EngineError;
use crate::models::PriceSample;
use std::collections::VecDeque;

/// Default number of samples retained per instrument
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Bounded, time-ordered window of recent prices for one instrument
///
/// Oldest samples are evicted first once the window is full.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    instrument: String,
    samples: VecDeque<PriceSample>,
    capacity: usize,
}

impl PriceHistory {
    /// Create an empty history
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of samples to keep (at least 1)
    pub fn new(instrument: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            instrument: instrument.into(),
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    ///
    /// Rejects non-finite or non-positive prices and samples older than
    /// the newest one already retained.
    pub fn push(&mut self, sample: PriceSample) -> Result<(), EngineError> {
        if !sample.price.is_finite() || sample.price <= 0.0 {
            return Err(EngineError::InvalidPrice {
                instrument: self.instrument.clone(),
                price: sample.price,
            });
        }

        if let Some(newest) = self.samples.back() {
            if sample.timestamp < newest.timestamp {
                return Err(EngineError::OutOfOrderSample {
                    instrument: self.instrument.clone(),
                    at: sample.timestamp,
                    newest: newest.timestamp,
                });
            }
        }

        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }

        Ok(())
    }

    /// All retained samples, oldest first
    pub fn samples(&self) -> Vec<PriceSample> {
        self.samples.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
