use chrono::Utc;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::DynamicMonitor;
use crate::lock;

pub(super) struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DynamicMonitor {
    /// Spawn the periodic re-evaluation loop
    ///
    /// Returns false if a loop is already running for this monitor.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut slot = lock(&self.scheduler);
        if slot.as_ref().is_some_and(|h| !h.task.is_finished()) {
            tracing::debug!("Monitor scheduler already running");
            return false;
        }

        let (stop, stop_rx) = watch::channel(false);
        let period = self.settings.check_interval;
        let task = tokio::spawn(run_loop(Arc::downgrade(self), period, stop_rx));

        *slot = Some(SchedulerHandle { stop, task });
        tracing::info!("⏰ Monitor started (every {:?})", period);
        true
    }

    /// Signal the loop to stop and wait for an in-progress tick to finish
    ///
    /// Executions already handed off keep running; use `settle_executions`
    /// to wait for them. Returns false if nothing was running.
    pub async fn stop(&self) -> bool {
        let Some(handle) = lock(&self.scheduler).take() else {
            return false;
        };

        // Loop may already have exited on its own
        let _ = handle.stop.send(true);
        if let Err(e) = handle.task.await {
            tracing::warn!("Monitor task ended abnormally: {}", e);
        }

        tracing::info!("Monitor stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.scheduler)
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }
}

async fn run_loop(monitor: Weak<DynamicMonitor>, period: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now(), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };

                let report = monitor.tick(Utc::now()).await;
                monitor.reap_executions();
                if !report.signals.is_empty() || report.price_failures > 0 {
                    tracing::info!(
                        "Monitor tick: {} evaluated, {} price failures, {} entries dispatched",
                        report.evaluated,
                        report.price_failures,
                        report.signals.len()
                    );
                } else {
                    tracing::debug!("Monitor tick: {} evaluated", report.evaluated);
                }
            }
        }
    }
}
