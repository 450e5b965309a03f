//! Accountant: the campaign ledger.
//!
//! Holds capital, peak, P&L and strike counters as atomics so the
//! read-modify-write contract holds even if strikes are later resolved
//! concurrently. All mutation goes through [`CampaignState::apply_result`],
//! which is serialised internally; callers only ever see snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::debug;

// ---------------------------------------------------------------------------
// Money helpers
// ---------------------------------------------------------------------------

/// USD → integer cents, rounded half away from zero.
pub fn usd_to_cents(usd: Decimal) -> i64 {
    (usd * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(if usd.is_sign_negative() { i64::MIN } else { i64::MAX })
}

/// f64 USD → integer cents. Non-finite input maps to zero.
pub fn f64_usd_to_cents(usd: f64) -> i64 {
    Decimal::from_f64(usd).map(usd_to_cents).unwrap_or(0)
}

pub fn cents_to_usd(cents: i64) -> f64 {
    cents as f64 / 100.0
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Resolved result of one attempted strike, applied to the ledger exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikeOutcome {
    pub strike_id: u64,
    pub pnl_cents: i64,
    /// Hit resets the miss streak; anything else extends it.
    pub hit: bool,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Point-in-time copy of the ledger for reporting and risk checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    pub capital_cents: i64,
    pub peak_capital_cents: i64,
    pub total_pnl_cents: i64,
    pub total_strikes: u64,
    pub successful_strikes: u64,
    pub failed_strikes: u64,
    pub consecutive_misses: u64,
    pub trades_completed: u64,
    /// Execution failures since the last resolved strike.
    #[serde(default)]
    pub consecutive_aborts: u64,
}

impl fmt::Display for CampaignSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capital=${:.2} peak=${:.2} pnl=${:.2} | strikes={} (W{}/L{}) | streak={} | drawdown={:.2}%",
            cents_to_usd(self.capital_cents),
            cents_to_usd(self.peak_capital_cents),
            cents_to_usd(self.total_pnl_cents),
            self.total_strikes,
            self.successful_strikes,
            self.failed_strikes,
            self.consecutive_misses,
            self.drawdown() * 100.0,
        )
    }
}

impl CampaignSnapshot {
    /// Drawdown from peak as a fraction (0.0 = at peak).
    pub fn drawdown(&self) -> f64 {
        if self.peak_capital_cents <= 0 {
            0.0
        } else {
            1.0 - self.capital_cents as f64 / self.peak_capital_cents as f64
        }
    }

    /// Hit rate as a percentage. 0.0 if nothing resolved.
    pub fn win_rate(&self) -> f64 {
        if self.total_strikes == 0 {
            0.0
        } else {
            self.successful_strikes as f64 / self.total_strikes as f64 * 100.0
        }
    }
}

// ---------------------------------------------------------------------------
// Campaign state
// ---------------------------------------------------------------------------

pub struct CampaignState {
    initial_capital_cents: i64,
    capital_cents: AtomicI64,
    peak_capital_cents: AtomicI64,
    total_pnl_cents: AtomicI64,
    total_strikes: AtomicU64,
    successful_strikes: AtomicU64,
    failed_strikes: AtomicU64,
    consecutive_misses: AtomicU64,
    trades_completed: AtomicU64,
    consecutive_aborts: AtomicU64,
    started_at: DateTime<Utc>,
    /// Serialises `apply_result` so peak ≥ capital holds across writers.
    apply_lock: Mutex<()>,
}

impl fmt::Debug for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CampaignState")
            .field("snapshot", &self.snapshot())
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl CampaignState {
    pub fn new(initial_capital_cents: i64) -> Self {
        Self {
            initial_capital_cents,
            capital_cents: AtomicI64::new(initial_capital_cents),
            peak_capital_cents: AtomicI64::new(initial_capital_cents),
            total_pnl_cents: AtomicI64::new(0),
            total_strikes: AtomicU64::new(0),
            successful_strikes: AtomicU64::new(0),
            failed_strikes: AtomicU64::new(0),
            consecutive_misses: AtomicU64::new(0),
            trades_completed: AtomicU64::new(0),
            consecutive_aborts: AtomicU64::new(0),
            started_at: Utc::now(),
            apply_lock: Mutex::new(()),
        }
    }

    pub fn initial_capital_cents(&self) -> i64 {
        self.initial_capital_cents
    }

    pub fn capital_cents(&self) -> i64 {
        self.capital_cents.load(Ordering::Acquire)
    }

    pub fn trades_completed(&self) -> u64 {
        self.trades_completed.load(Ordering::Acquire)
    }

    /// Apply a resolved strike: capital, P&L, peak, counters, streak.
    /// Returns the post-update snapshot.
    pub fn apply_result(&self, outcome: StrikeOutcome) -> CampaignSnapshot {
        let _guard = self.apply_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let capital = self.capital_cents.fetch_add(outcome.pnl_cents, Ordering::AcqRel) + outcome.pnl_cents;
        self.total_pnl_cents.fetch_add(outcome.pnl_cents, Ordering::AcqRel);
        self.peak_capital_cents.fetch_max(capital, Ordering::AcqRel);
        self.total_strikes.fetch_add(1, Ordering::AcqRel);

        if outcome.hit {
            self.successful_strikes.fetch_add(1, Ordering::AcqRel);
            self.consecutive_misses.store(0, Ordering::Release);
        } else {
            self.failed_strikes.fetch_add(1, Ordering::AcqRel);
            self.consecutive_misses.fetch_add(1, Ordering::AcqRel);
        }
        self.trades_completed.fetch_add(1, Ordering::AcqRel);
        self.consecutive_aborts.store(0, Ordering::Release);

        let snap = self.snapshot();
        debug!(
            strike_id = outcome.strike_id,
            pnl = format!("${:.2}", cents_to_usd(outcome.pnl_cents)),
            capital = format!("${:.2}", cents_to_usd(snap.capital_cents)),
            peak = format!("${:.2}", cents_to_usd(snap.peak_capital_cents)),
            streak = snap.consecutive_misses,
            "Result applied"
        );
        snap
    }

    /// Count an execution failure. Capital and strike counters are untouched;
    /// the next resolved strike clears the streak.
    pub fn record_abort(&self) -> CampaignSnapshot {
        let _guard = self.apply_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.consecutive_aborts.fetch_add(1, Ordering::AcqRel);
        self.snapshot()
    }

    pub fn snapshot(&self) -> CampaignSnapshot {
        CampaignSnapshot {
            capital_cents: self.capital_cents.load(Ordering::Acquire),
            peak_capital_cents: self.peak_capital_cents.load(Ordering::Acquire),
            total_pnl_cents: self.total_pnl_cents.load(Ordering::Acquire),
            total_strikes: self.total_strikes.load(Ordering::Acquire),
            successful_strikes: self.successful_strikes.load(Ordering::Acquire),
            failed_strikes: self.failed_strikes.load(Ordering::Acquire),
            consecutive_misses: self.consecutive_misses.load(Ordering::Acquire),
            trades_completed: self.trades_completed.load(Ordering::Acquire),
            consecutive_aborts: self.consecutive_aborts.load(Ordering::Acquire),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
