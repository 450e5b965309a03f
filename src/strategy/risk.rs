//! Emergency-stop rules.
//!
//! Checked after every resolved strike. Any trigger halts the campaign;
//! open positions are not flattened.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

use crate::engine::accountant::CampaignSnapshot;

/// Hard floor: capital below this share of peak always halts.
pub const HARD_FLOOR_PCT: i64 = 85;

#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Stricter configurable drawdown from peak, in percent (10.0 = 10%).
    pub max_drawdown_pct: Option<f64>,
    pub max_consecutive_misses: u64,
    /// Execution failures in a row (rejections, no-fills) before halting.
    pub max_consecutive_aborts: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown_pct: Some(10.0),
            max_consecutive_misses: 20,
            max_consecutive_aborts: 5,
        }
    }
}

/// Which rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EmergencyTrigger {
    HardFloor { capital_cents: i64, peak_cents: i64 },
    MaxDrawdown { capital_cents: i64, threshold_cents: i64, max_drawdown_pct: f64 },
    ConsecutiveMisses { misses: u64, limit: u64 },
    ConsecutiveAborts { aborts: u64, limit: u64 },
}

impl fmt::Display for EmergencyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmergencyTrigger::HardFloor { capital_cents, peak_cents } => write!(
                f,
                "capital ${:.2} fell below {HARD_FLOOR_PCT}% of peak ${:.2}",
                *capital_cents as f64 / 100.0,
                *peak_cents as f64 / 100.0
            ),
            EmergencyTrigger::MaxDrawdown { capital_cents, threshold_cents, max_drawdown_pct } => write!(
                f,
                "configured drawdown {max_drawdown_pct:.2}% hit: capital ${:.2} < ${:.2}",
                *capital_cents as f64 / 100.0,
                *threshold_cents as f64 / 100.0
            ),
            EmergencyTrigger::ConsecutiveMisses { misses, limit } => {
                write!(f, "{misses} consecutive misses (limit {limit})")
            }
            EmergencyTrigger::ConsecutiveAborts { aborts, limit } => {
                write!(f, "{aborts} consecutive execution failures (limit {limit})")
            }
        }
    }
}

pub struct RiskGuard {
    config: RiskConfig,
}

impl RiskGuard {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Evaluate all stop rules against a snapshot.
    pub fn check(&self, snap: &CampaignSnapshot) -> Option<EmergencyTrigger> {
        let trigger = self.evaluate(snap);
        if let Some(t) = trigger {
            error!(trigger = %t, "EMERGENCY STOP");
        }
        trigger
    }

    fn evaluate(&self, snap: &CampaignSnapshot) -> Option<EmergencyTrigger> {
        let capital = snap.capital_cents;
        let peak = snap.peak_capital_cents;

        if (capital as i128) * 100 < (peak as i128) * HARD_FLOOR_PCT as i128 {
            return Some(EmergencyTrigger::HardFloor {
                capital_cents: capital,
                peak_cents: peak,
            });
        }

        if let Some(dd) = self.config.max_drawdown_pct.filter(|d| *d > 0.0) {
            let threshold = (peak as f64 * (1.0 - dd / 100.0)) as i64;
            if capital < threshold {
                return Some(EmergencyTrigger::MaxDrawdown {
                    capital_cents: capital,
                    threshold_cents: threshold,
                    max_drawdown_pct: dd,
                });
            }
        }

        if snap.consecutive_misses >= self.config.max_consecutive_misses {
            return Some(EmergencyTrigger::ConsecutiveMisses {
                misses: snap.consecutive_misses,
                limit: self.config.max_consecutive_misses,
            });
        }

        if snap.consecutive_aborts >= self.config.max_consecutive_aborts {
            return Some(EmergencyTrigger::ConsecutiveAborts {
                aborts: snap.consecutive_aborts,
                limit: self.config.max_consecutive_aborts,
            });
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
