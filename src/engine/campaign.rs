//! Campaign controller.
//!
//! Drives generate → execute → apply → check until the trade count is
//! reached, the target capital is reached, the time window elapses, an
//! emergency stop fires, or shutdown is requested. One strike is fully
//! resolved before the next is generated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::accountant::{cents_to_usd, CampaignSnapshot, CampaignState};
use super::executor::StrikeExecutor;
use crate::strategy::risk::{EmergencyTrigger, RiskGuard};
use crate::strategy::{Candidate, StrikeSource};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CampaignConfig {
    /// Completed trades after which the campaign ends.
    pub total_trades: u64,
    pub target_capital_cents: i64,
    pub window: Duration,
    /// Target-capital and time-window stops. Off in simulation.
    pub production_stops: bool,
    /// Delay between iterations, skips included.
    pub cooldown: Duration,
    /// Log progress every N completed trades. 0 disables.
    pub progress_every: u64,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            total_trades: 2_500,
            target_capital_cents: 11_850_000,
            window: Duration::from_secs(5 * 24 * 3600),
            production_stops: true,
            cooldown: Duration::from_millis(1),
            progress_every: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    TradeCountReached,
    TargetReached,
    TimeWindowElapsed,
    EmergencyStop { trigger: EmergencyTrigger },
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TradeCountReached => write!(f, "trade count reached"),
            StopReason::TargetReached => write!(f, "target capital reached"),
            StopReason::TimeWindowElapsed => write!(f, "campaign window elapsed"),
            StopReason::EmergencyStop { trigger } => write!(f, "emergency stop: {trigger}"),
            StopReason::Shutdown => write!(f, "shutdown requested"),
        }
    }
}

/// Final campaign result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignReport {
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub initial_capital_cents: i64,
    pub final_state: CampaignSnapshot,
    /// Candidates skipped before execution. Not trades.
    pub skipped: u64,
    /// Strikes aborted during execution. Not trades.
    pub aborted: u64,
    pub stop_reason: StopReason,
}

impl CampaignReport {
    pub fn total_return_pct(&self) -> f64 {
        if self.initial_capital_cents <= 0 {
            return 0.0;
        }
        (self.final_state.capital_cents - self.initial_capital_cents) as f64 / self.initial_capital_cents as f64 * 100.0
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct Campaign<S, X> {
    source: S,
    executor: X,
    guard: RiskGuard,
    state: Arc<CampaignState>,
    config: CampaignConfig,
    shutdown: watch::Receiver<bool>,
    mode: String,
}

impl<S: StrikeSource, X: StrikeExecutor> Campaign<S, X> {
    pub fn new(
        source: S,
        executor: X,
        guard: RiskGuard,
        state: Arc<CampaignState>,
        config: CampaignConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mode = format!("{}/{}", source.name(), executor.name());
        Self {
            source,
            executor,
            guard,
            state,
            config,
            shutdown,
            mode,
        }
    }

    /// Check the pre-iteration stop conditions.
    fn should_stop(&self, started: Instant) -> Option<StopReason> {
        if *self.shutdown.borrow() {
            return Some(StopReason::Shutdown);
        }
        if self.state.trades_completed() >= self.config.total_trades {
            return Some(StopReason::TradeCountReached);
        }
        if self.config.production_stops {
            if self.state.capital_cents() >= self.config.target_capital_cents {
                return Some(StopReason::TargetReached);
            }
            if started.elapsed() >= self.config.window {
                return Some(StopReason::TimeWindowElapsed);
            }
        }
        None
    }

    pub async fn run(&mut self) -> CampaignReport {
        let started = Instant::now();
        let started_at = Utc::now();
        let mut skipped = 0u64;
        let mut aborted = 0u64;

        info!(
            mode = %self.mode,
            capital = format!("${:.2}", cents_to_usd(self.state.capital_cents())),
            total_trades = self.config.total_trades,
            production_stops = self.config.production_stops,
            "Campaign started"
        );

        let stop_reason = loop {
            if let Some(reason) = self.should_stop(started) {
                break reason;
            }

            match self.source.next().await {
                Ok(Candidate::Skip(reason)) => {
                    skipped += 1;
                    debug!(reason = %reason, "Skip");
                }
                Err(e) => {
                    skipped += 1;
                    warn!(error = %e, "Strike generation failed");
                }
                Ok(Candidate::Strike(mut strike)) => {
                    let capital = self.state.capital_cents();
                    match self.executor.execute(&mut strike, capital).await {
                        Ok(outcome) => {
                            let snap = self.state.apply_result(outcome);
                            info!(
                                strike_id = strike.id,
                                symbol = %strike.symbol,
                                category = %strike.category,
                                status = %strike.status,
                                pnl = format!("${:.2}", cents_to_usd(outcome.pnl_cents)),
                                capital = format!("${:.2}", cents_to_usd(snap.capital_cents)),
                                "Strike resolved"
                            );
                            self.log_progress(&snap, started);

                            if let Some(trigger) = self.guard.check(&snap) {
                                break StopReason::EmergencyStop { trigger };
                            }
                        }
                        Err(e) => {
                            aborted += 1;
                            if e.is_routine() {
                                debug!(strike_id = strike.id, reason = %e, "Strike skipped at execution");
                            } else {
                                error!(strike_id = strike.id, symbol = %strike.symbol, error = %e, "Strike aborted");
                                let snap = self.state.record_abort();
                                if let Some(trigger) = self.guard.check(&snap) {
                                    break StopReason::EmergencyStop { trigger };
                                }
                            }
                        }
                    }
                }
            }

            if !self.config.cooldown.is_zero() {
                tokio::time::sleep(self.config.cooldown).await;
            }
        };

        let report = CampaignReport {
            mode: self.mode.clone(),
            started_at,
            finished_at: Utc::now(),
            elapsed_secs: started.elapsed().as_secs_f64(),
            initial_capital_cents: self.state.initial_capital_cents(),
            final_state: self.state.snapshot(),
            skipped,
            aborted,
            stop_reason,
        };
        log_summary(&report);
        report
    }

    fn log_progress(&self, snap: &CampaignSnapshot, started: Instant) {
        let every = self.config.progress_every;
        if every == 0 || snap.trades_completed % every != 0 {
            return;
        }
        let initial = self.state.initial_capital_cents();
        let elapsed = started.elapsed().as_secs_f64();
        let return_pct = if initial > 0 {
            (snap.capital_cents - initial) as f64 / initial as f64 * 100.0
        } else {
            0.0
        };
        info!(
            trades = snap.trades_completed,
            capital = format!("${:.2}", cents_to_usd(snap.capital_cents)),
            return_pct = format!("{:.2}%", return_pct),
            win_rate = format!("{:.1}%", snap.win_rate()),
            trades_per_sec = format!("{:.1}", if elapsed > 0.0 { snap.trades_completed as f64 / elapsed } else { 0.0 }),
            "Progress"
        );
    }
}

fn log_summary(report: &CampaignReport) {
    let snap = &report.final_state;
    info!(
        mode = %report.mode,
        stop_reason = %report.stop_reason,
        initial = format!("${:.2}", cents_to_usd(report.initial_capital_cents)),
        final_capital = format!("${:.2}", cents_to_usd(snap.capital_cents)),
        pnl = format!("${:.2}", cents_to_usd(snap.total_pnl_cents)),
        return_pct = format!("{:.2}%", report.total_return_pct()),
        strikes = snap.total_strikes,
        hits = snap.successful_strikes,
        misses = snap.failed_strikes,
        skipped = report.skipped,
        aborted = report.aborted,
        elapsed_secs = format!("{:.1}", report.elapsed_secs),
        "Campaign complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
