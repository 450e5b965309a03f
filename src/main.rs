//! STRIKE ENGINE: strike execution and risk-control loop
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! the generator/executor pair for the selected run mode, and runs the
//! campaign until it stops or Ctrl+C is pressed. The final report is
//! written to disk.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use strike_engine::analysis::oracle::OracleProcess;
use strike_engine::analysis::AnalysisGateway;
use strike_engine::config::{self, RunMode};
use strike_engine::engine::accountant::CampaignState;
use strike_engine::engine::campaign::{Campaign, CampaignReport};
use strike_engine::engine::executor::{LiveExecutor, SimulatedExecutor, StrikeExecutor};
use strike_engine::exchange::kraken::KrakenClient;
use strike_engine::storage;
use strike_engine::strategy::generator::{AnalysisGenerator, SimulatedGenerator};
use strike_engine::strategy::risk::RiskGuard;
use strike_engine::strategy::sizing::PositionSizer;
use strike_engine::strategy::StrikeSource;

const BANNER: &str = r#"
 ____ _____ ____  ___ _  _______
/ ___|_   _|  _ \|_ _| |/ / ____|
\___ \ | | | |_) || || ' /|  _|
 ___) || | |  _ < | || . \| |___
|____/ |_| |_| \_\___|_|\_\_____|

  Strike execution and risk-control engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Initialise structured logging before config so load errors are visible
    init_logging();

    let cfg = config::AppConfig::load_or_default("config.toml").context("Configuration error")?;

    println!("{BANNER}");
    info!(
        mode = %cfg.mode,
        initial_capital = format!("${:.2}", cfg.campaign.initial_capital),
        total_trades = cfg.campaign.total_trades,
        min_confidence = cfg.strike.min_confidence,
        "STRIKE ENGINE starting up"
    );
    if cfg.mode == RunMode::Simulation {
        warn!("Simulation mode: outcomes are random draws and say nothing about live performance");
    }

    // The previous run's report is about to be overwritten.
    match storage::load_report(Some(&cfg.report.path)) {
        Ok(Some(prev)) => info!(
            path = %cfg.report.path,
            mode = %prev.mode,
            finished_at = %prev.finished_at,
            stop_reason = %prev.stop_reason,
            return_pct = format!("{:.2}%", prev.total_return_pct()),
            "Previous campaign report found"
        ),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Previous campaign report unreadable"),
    }

    // -- Shutdown flag ---------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received; finishing the in-flight strike.");
            let _ = shutdown_tx.send(true);
        }
    });

    // -- Initialise components -------------------------------------------

    let state = Arc::new(CampaignState::new(cfg.initial_capital_cents()));
    let sizer = PositionSizer::new(cfg.sizing_config())?;
    let guard = RiskGuard::new(cfg.risk_config());
    let seed = cfg.strike.seed;

    let report = match cfg.mode {
        RunMode::Simulation => {
            let source = SimulatedGenerator::new(seed);
            let executor = SimulatedExecutor::new(sizer, cfg.simulation_params(), seed);
            run_campaign(source, executor, guard, state, &cfg, shutdown_rx).await
        }
        RunMode::Paper => {
            let source = analysis_generator(&cfg);
            let executor = SimulatedExecutor::new(sizer, cfg.simulation_params(), seed);
            run_campaign(source, executor, guard, state, &cfg, shutdown_rx).await
        }
        RunMode::Live => {
            let creds = cfg.credentials(|name| std::env::var(name).ok())?;
            let exchange = KrakenClient::new(
                creds.api_key,
                &creds.api_secret,
                cfg.exchange.base_url.clone(),
                Some(Duration::from_secs(cfg.exchange.request_timeout_secs)),
            )
            .context("Exchange client setup failed")?;
            info!(
                order_usd_size = format!("${:.2}", cfg.live.order_usd_size),
                hold_secs = cfg.live.hold_secs,
                "LIVE TRADING ENABLED"
            );
            let source = analysis_generator(&cfg);
            let executor = LiveExecutor::new(exchange, sizer, cfg.live.order_usd_size, cfg.live_timing());
            run_campaign(source, executor, guard, state, &cfg, shutdown_rx).await
        }
    };

    // Save final report
    if let Err(e) = storage::save_report(&report, Some(&cfg.report.path)) {
        error!(error = %e, "Failed to save campaign report");
    }
    info!(
        final_capital = format!("${:.2}", report.final_state.capital_cents as f64 / 100.0),
        strikes = report.final_state.total_strikes,
        hits = report.final_state.successful_strikes,
        misses = report.final_state.failed_strikes,
        elapsed_secs = format!("{:.1}", report.elapsed_secs),
        "STRIKE ENGINE shut down cleanly."
    );

    Ok(())
}

fn analysis_generator(cfg: &config::AppConfig) -> AnalysisGenerator<OracleProcess> {
    let oracle = OracleProcess::new(
        cfg.oracle.program.clone(),
        cfg.oracle.args.clone(),
        Some(Duration::from_secs(cfg.oracle.timeout_secs)),
    );
    AnalysisGenerator::new(AnalysisGateway::new(oracle, cfg.strike.min_confidence))
}

async fn run_campaign<S: StrikeSource, X: StrikeExecutor>(
    source: S,
    executor: X,
    guard: RiskGuard,
    state: Arc<CampaignState>,
    cfg: &config::AppConfig,
    shutdown: watch::Receiver<bool>,
) -> CampaignReport {
    let mut campaign = Campaign::new(source, executor, guard, state, cfg.campaign_config(), shutdown);
    campaign.run().await
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strike_engine=info"));

    let json_logging = std::env::var("STRIKE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
