use std::collections::VecDeque;
use std::time::Duration;

/// Number of recent scan durations averaged
const DURATION_HISTORY: usize = 10;

/// Fraction of the interval a scan is allowed to occupy
const TARGET_UTILIZATION: f64 = 0.7;

/// Adapts the rescan interval to how long scans actually take
///
/// The next interval leaves 30% headroom over the mean of the last ten
/// scan durations, clamped to `[min, max]`.
#[derive(Debug, Clone)]
pub struct AdaptiveScanSchedule {
    initial: Duration,
    min: Duration,
    max: Duration,
    durations: VecDeque<Duration>,
}

impl AdaptiveScanSchedule {
    pub fn new(initial: Duration, min: Duration, max: Duration) -> Self {
        Self {
            initial,
            min,
            max: max.max(min),
            durations: VecDeque::with_capacity(DURATION_HISTORY),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.durations.push_back(duration);
        while self.durations.len() > DURATION_HISTORY {
            self.durations.pop_front();
        }
        tracing::debug!(
            "Scan took {:.1}s ({} recorded)",
            duration.as_secs_f64(),
            self.durations.len()
        );
    }

    pub fn next_interval(&self) -> Duration {
        if self.durations.is_empty() {
            return self.initial;
        }

        let total: f64 = self.durations.iter().map(Duration::as_secs_f64).sum();
        let mean = total / self.durations.len() as f64;
        let target = Duration::from_secs_f64(mean / TARGET_UTILIZATION);
        let next = target.clamp(self.min, self.max);

        tracing::info!(
            "Scan interval: mean {:.1}s -> target {:.1}s -> {}s",
            mean,
            target.as_secs_f64(),
            next.as_secs()
        );
        next
    }

    pub fn recorded(&self) -> usize {
        self.durations.len()
    }
}

impl Default for AdaptiveScanSchedule {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(180),
            Duration::from_secs(120),
            Duration::from_secs(600),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_interval_without_history() {
        let schedule = AdaptiveScanSchedule::default();
        assert_eq!(schedule.next_interval(), Duration::from_secs(180));
    }

    #[test]
    fn test_headroom_over_mean() {
        let mut schedule = AdaptiveScanSchedule::default();
        schedule.record(Duration::from_secs(140));
        schedule.record(Duration::from_secs(140));

        // 140 / 0.7 = 200
        assert_eq!(schedule.next_interval().as_secs(), 200);
    }

    #[test]
    fn test_clamped_to_bounds() {
        let mut fast = AdaptiveScanSchedule::default();
        fast.record(Duration::from_secs(10));
        assert_eq!(fast.next_interval(), Duration::from_secs(120));

        let mut slow = AdaptiveScanSchedule::default();
        slow.record(Duration::from_secs(1000));
        assert_eq!(slow.next_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_keeps_last_ten_durations() {
        let mut schedule = AdaptiveScanSchedule::default();
        for _ in 0..5 {
            schedule.record(Duration::from_secs(1000));
        }
        for _ in 0..10 {
            schedule.record(Duration::from_secs(210));
        }

        assert_eq!(schedule.recorded(), 10);
        // Only the 210s runs remain: 210 / 0.7 = 300
        assert_eq!(schedule.next_interval().as_secs(), 300);
    }
}
