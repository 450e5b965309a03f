//! Position sizing.
//!
//! `size = capital × strike_force × confidence × leverage`, where leverage
//! is the upper band bound for momentum/volatility strikes and the lower
//! bound otherwise. With a risk budget configured, size is capped so a
//! stop-loss-distance loss at the chosen leverage never exceeds
//! `capital × risk_per_trade_pct`.

use tracing::debug;

use crate::types::{StrikeCategory, TradeError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-trade risk budget.
#[derive(Debug, Clone, Copy)]
pub struct RiskBudget {
    /// Maximum loss per trade as a fraction of capital (0.01 = 1%).
    pub risk_per_trade_pct: f64,
    /// Stop-loss distance as a fraction of entry used to convert the budget
    /// into a size cap.
    pub stop_loss_pct: f64,
}

#[derive(Debug, Clone)]
pub struct SizingConfig {
    /// Fraction of capital committed per strike before leverage.
    pub strike_force_pct: f64,
    pub min_leverage: u32,
    pub max_leverage: u32,
    pub risk_budget: Option<RiskBudget>,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            strike_force_pct: 0.15,
            min_leverage: 3,
            max_leverage: 5,
            risk_budget: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sizer
// ---------------------------------------------------------------------------

/// Sized position for one strike.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSize {
    /// Leveraged notional in USD.
    pub size_usd: f64,
    pub leverage: u32,
    /// Whether the risk budget reduced the size.
    pub risk_capped: bool,
}

pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Result<Self, TradeError> {
        if config.min_leverage == 0 || config.min_leverage > config.max_leverage {
            return Err(TradeError::Configuration(format!(
                "leverage band [{}, {}] is invalid",
                config.min_leverage, config.max_leverage
            )));
        }
        if !(config.strike_force_pct > 0.0 && config.strike_force_pct <= 1.0) {
            return Err(TradeError::Configuration(format!(
                "strike force {} must be in (0, 1]",
                config.strike_force_pct
            )));
        }
        Ok(Self { config })
    }

    /// Intended leverage for a category, always within the configured band.
    pub fn leverage_for(&self, category: StrikeCategory) -> u32 {
        if category.uses_max_leverage() {
            self.config.max_leverage
        } else {
            self.config.min_leverage
        }
    }

    /// Size a strike against current capital (in cents).
    pub fn size(&self, capital_cents: i64, confidence: f64, category: StrikeCategory) -> PositionSize {
        let capital = capital_cents.max(0) as f64 / 100.0;
        let leverage = self.leverage_for(category);
        let mut size_usd = capital * self.config.strike_force_pct * confidence.clamp(0.0, 1.0) * leverage as f64;
        let mut risk_capped = false;

        if let Some(budget) = self.config.risk_budget {
            if budget.risk_per_trade_pct > 0.0 && budget.stop_loss_pct > 0.0 {
                let risk_usd = capital * budget.risk_per_trade_pct;
                let max_by_risk = risk_usd / (budget.stop_loss_pct * leverage as f64);
                if max_by_risk < size_usd {
                    size_usd = max_by_risk;
                    risk_capped = true;
                }
            }
        }

        debug!(
            capital = format!("${:.2}", capital),
            confidence = format!("{:.3}", confidence),
            leverage,
            size = format!("${:.2}", size_usd),
            risk_capped,
            "Position sized"
        );

        PositionSize {
            size_usd,
            leverage,
            risk_capped,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
