use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use entrybot::config::AppConfig;
use entrybot::discovery::{
    rank, sanitize_scan, select, CachedOracle, ScoringOracle, StaticOracle,
};
use entrybot::execution::PaperBroker;
use entrybot::models::{Candidate, RiskProfile, ScanResult, TimingAssessment};
use entrybot::session::TradingSession;
use entrybot::sim::RandomWalkPrices;
use entrybot::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{interval_at, Duration, Instant};
use tracing_subscriber::EnvFilter;

const STATUS_INTERVAL_SECS: u64 = 300;
const SHUTDOWN_GRACE_SECS: u64 = 30;

// ============================================================================
// CLI
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "entrybot", about = "Shortlist-driven entry timing bot (paper trading)")]
struct Cli {
    /// Config file (defaults to ./entrybot.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a paper-trading session, re-reading the scan file every cycle
    Run {
        #[arg(short, long)]
        scan_file: PathBuf,

        /// Overrides monitor.risk_profile
        #[arg(short, long, value_enum)]
        risk: Option<RiskArg>,

        /// Seed for simulated prices
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Print the shortlist for a scan file and exit
    Select {
        #[arg(short, long)]
        scan_file: PathBuf,

        #[arg(short, long, value_enum)]
        risk: Option<RiskArg>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RiskArg {
    High,
    Low,
}

impl From<RiskArg> for RiskProfile {
    fn from(arg: RiskArg) -> Self {
        match arg {
            RiskArg::High => RiskProfile::HighRisk,
            RiskArg::Low => RiskProfile::LowRisk,
        }
    }
}

/// Scanner output plus oracle assessments, as written by the upstream scanner
#[derive(Debug, Deserialize)]
struct ScanFile {
    scans: Vec<ScanResult>,
    #[serde(default)]
    assessments: HashMap<String, TimingAssessment>,
    /// Starting prices for the simulated feed
    #[serde(default)]
    prices: HashMap<String, f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut cfg = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    setup_logging(&cfg.log.filter);

    match cli.command {
        Command::Run {
            scan_file,
            risk,
            seed,
        } => {
            if let Some(risk) = risk {
                cfg.monitor.risk_profile = risk.into();
            }
            run(cfg, &scan_file, seed).await
        }
        Command::Select { scan_file, risk } => {
            if let Some(risk) = risk {
                cfg.monitor.risk_profile = risk.into();
            }
            print_shortlist(&cfg, &scan_file).await
        }
    }
}

// ============================================================================
// Run
// ============================================================================

async fn run(cfg: AppConfig, scan_path: &Path, seed: u64) -> Result<()> {
    tracing::info!("🚀 entrybot starting (paper trading)");

    let scan_file = read_scan_file(scan_path)?;
    let oracle = Arc::new(StaticOracle::new(scan_file.assessments.clone()));

    let prices = Arc::new(RandomWalkPrices::new(seed));
    for (instrument, price) in &scan_file.prices {
        prices.set_price(instrument, *price);
    }

    let (session, broker) = TradingSession::paper(&cfg, oracle, prices);

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Risk profile: {}", cfg.monitor.risk_profile);
    tracing::info!("  Shortlist size: {}", cfg.monitor.shortlist_size);
    tracing::info!("  Check interval: {}s", cfg.monitor.check_interval_secs);
    tracing::info!("  Stake: {}% of balance", cfg.execution.sizing.stake_pct);
    tracing::info!("  Max daily entries: {}", cfg.execution.limits.max_daily_entries);
    tracing::info!("  Paper cash: {:.0}\n", cfg.execution.initial_cash);

    let report = session.on_scan(scan_file.scans, Utc::now()).await;
    tracing::info!(
        "✅ Initial selection: {:?} ({} immediate entries)",
        report.shortlist,
        report.executions.len()
    );

    session.monitor().start();

    let mut schedule = cfg.scan_schedule();
    let mut status_ticker = interval_at(
        Instant::now() + Duration::from_secs(STATUS_INTERVAL_SECS),
        Duration::from_secs(STATUS_INTERVAL_SECS),
    );

    loop {
        let next_scan = schedule.next_interval();
        tracing::debug!("Next scan in {:.0}s", next_scan.as_secs_f64());

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Shutdown requested");
                break;
            }
            _ = status_ticker.tick() => {
                log_status(&session, &broker);
            }
            _ = tokio::time::sleep(next_scan) => {
                let started = Instant::now();
                if let Err(e) = rescan(&session, scan_path).await {
                    tracing::warn!("Rescan failed, keeping current shortlist: {:#}", e);
                }
                schedule.record(started.elapsed());
            }
        }
    }

    session.monitor().stop().await;

    let pending = session.monitor().executions_in_progress();
    if pending > 0 {
        tracing::info!("Waiting for {} in-flight entries", pending);
    }
    match tokio::time::timeout(
        Duration::from_secs(SHUTDOWN_GRACE_SECS),
        session.monitor().settle_executions(),
    )
    .await
    {
        Ok(settled) => tracing::debug!("{} entries settled at shutdown", settled.len()),
        Err(_) => tracing::warn!("Entries still in flight after {}s, exiting", SHUTDOWN_GRACE_SECS),
    }

    log_status(&session, &broker);
    Ok(())
}

/// Offer fresh high scorers for replacement, then rebuild the shortlist
async fn rescan(session: &TradingSession, scan_path: &Path) -> Result<()> {
    let scan_file = read_scan_file(scan_path)?;

    let mut fresh: Vec<Candidate> = sanitize_scan(scan_file.scans.clone())
        .iter()
        .filter_map(|scan| {
            scan_file
                .assessments
                .get(&scan.instrument)
                .map(|a| Candidate::from_assessment(scan, a, session.risk_profile()))
        })
        .collect();
    rank(&mut fresh);

    for candidate in fresh {
        if let Some(outcome) = session.offer_candidate(candidate).await {
            tracing::info!("Replacement outcome: {:?}", outcome);
        }
    }

    let report = session.on_scan(scan_file.scans, Utc::now()).await;
    tracing::info!(
        "🔍 Rescan: {} received, {} valid, {} assessed, shortlist {:?}",
        report.received,
        report.valid,
        report.assessed,
        report.shortlist
    );
    Ok(())
}

// ============================================================================
// Select
// ============================================================================

async fn print_shortlist(cfg: &AppConfig, scan_path: &Path) -> Result<()> {
    let scan_file = read_scan_file(scan_path)?;
    let oracle: Arc<dyn ScoringOracle> = Arc::new(StaticOracle::new(scan_file.assessments));
    let oracle = CachedOracle::new(oracle, cfg.oracle_timeout());

    let valid = sanitize_scan(scan_file.scans);
    let candidates: Vec<Candidate> = oracle
        .assess_all(&valid)
        .await
        .iter()
        .map(|(scan, assessment)| {
            Candidate::from_assessment(scan, assessment, cfg.monitor.risk_profile)
        })
        .collect();

    let shortlist = select(&candidates, cfg.monitor.shortlist_size);
    println!("{}", serde_json::to_string_pretty(&shortlist)?);
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn setup_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn read_scan_file(path: &Path) -> Result<ScanFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading scan file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing scan file {}", path.display()))
}

fn log_status(session: &TradingSession, broker: &PaperBroker) {
    let status = session.status();

    tracing::info!("\n📈 Status:");
    tracing::info!(
        "  Tracked: {} | Pending: {} | Entries today: {}",
        status.tracked_count,
        status.pending_signals.len(),
        session.coordinator().entries_today()
    );
    for instrument in &status.instruments {
        tracing::info!(
            "    {} {:?}/{:?} samples={} last={}",
            instrument.instrument,
            instrument.timing,
            instrument.strength,
            instrument.samples,
            instrument
                .last_price
                .map(|p| format!("{:.4}", p))
                .unwrap_or_else(|| "-".to_string())
        );
    }

    let positions = broker.positions();
    tracing::info!(
        "  Cash: {:.0} | Open positions: {} | Realized P&L: {:+.0}",
        broker.cash(),
        positions.len(),
        broker.realized_pnl()
    );
    for position in positions {
        tracing::info!(
            "    {} {:+.2}% since {}",
            position.instrument,
            position.unrealized_return_pct(),
            position.entry_time.format("%Y-%m-%d %H:%M")
        );
    }
}
