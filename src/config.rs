use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::discovery::{AdaptiveScanSchedule, DEFAULT_SHORTLIST_SIZE};
use crate::execution::DEFAULT_HISTORY_CAPACITY;
use crate::models::RiskProfile;
use crate::monitor::MonitorSettings;
use crate::risk::{EntryLimits, PositionSizer};
use crate::strategy::{TimingClassifier, TimingThresholds};

/// Looked up in the working directory when no path is given
const DEFAULT_CONFIG_NAME: &str = "entrybot";
const ENV_PREFIX: &str = "ENTRYBOT";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub timing: TimingConfig,
    pub execution: ExecutionConfig,
    pub oracle: OracleConfig,
    pub scan: ScanConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub check_interval_secs: u64,
    pub shortlist_size: usize,
    pub history_capacity: usize,
    pub lookup_timeout_secs: u64,
    pub risk_profile: RiskProfile,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            shortlist_size: DEFAULT_SHORTLIST_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            lookup_timeout_secs: 10,
            risk_profile: RiskProfile::LowRisk,
        }
    }
}

/// Threshold overrides; each profile must be given in full
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub high_risk: TimingThresholds,
    pub low_risk: TimingThresholds,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            high_risk: TimingThresholds::for_profile(RiskProfile::HighRisk),
            low_risk: TimingThresholds::for_profile(RiskProfile::LowRisk),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    pub sizing: PositionSizer,
    pub limits: EntryLimits,
    pub initial_cash: f64, // Paper account only
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            sizing: PositionSizer::default(),
            limits: EntryLimits::default(),
            initial_cash: 1_000_000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OracleConfig {
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScanConfig {
    pub initial_interval_secs: u64,
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            initial_interval_secs: 180,
            min_interval_secs: 120,
            max_interval_secs: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "entrybot=info".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the config file, then `ENTRYBOT__SECTION__KEY` variables
    ///
    /// Without an explicit path, `entrybot.toml` is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let cfg = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("building config")?;

        let app: AppConfig = cfg.try_deserialize().context("deserializing config")?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        if self.monitor.check_interval_secs == 0 {
            anyhow::bail!("monitor.check_interval_secs must be positive");
        }
        if self.monitor.shortlist_size == 0 {
            anyhow::bail!("monitor.shortlist_size must be positive");
        }
        if self.monitor.history_capacity < 2 {
            anyhow::bail!("monitor.history_capacity must hold at least two samples");
        }
        if self.monitor.lookup_timeout_secs == 0 {
            anyhow::bail!("monitor.lookup_timeout_secs must be positive");
        }
        if self.oracle.timeout_secs == 0 {
            anyhow::bail!("oracle.timeout_secs must be positive");
        }
        if self.scan.min_interval_secs > self.scan.max_interval_secs {
            anyhow::bail!(
                "scan.min_interval_secs ({}) exceeds scan.max_interval_secs ({})",
                self.scan.min_interval_secs,
                self.scan.max_interval_secs
            );
        }
        Ok(())
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            check_interval: Duration::from_secs(self.monitor.check_interval_secs),
            history_capacity: self.monitor.history_capacity,
            lookup_timeout: Duration::from_secs(self.monitor.lookup_timeout_secs),
        }
    }

    pub fn classifier(&self) -> TimingClassifier {
        TimingClassifier::new(self.timing.high_risk.clone(), self.timing.low_risk.clone())
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle.timeout_secs)
    }

    pub fn scan_schedule(&self) -> AdaptiveScanSchedule {
        AdaptiveScanSchedule::new(
            Duration::from_secs(self.scan.initial_interval_secs),
            Duration::from_secs(self.scan.min_interval_secs),
            Duration::from_secs(self.scan.max_interval_secs),
        )
    }
}
