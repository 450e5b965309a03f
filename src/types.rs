//! Shared types for the strike engine.
//!
//! These types form the data model used across all modules: the strike
//! itself and its lifecycle, the analysis oracle's response, and the
//! trade error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::exchange::ExchangeError;

// ---------------------------------------------------------------------------
// Strike identity
// ---------------------------------------------------------------------------

static NEXT_STRIKE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next strike ID. Unique and increasing for the process lifetime.
pub fn next_strike_id() -> u64 {
    NEXT_STRIKE_ID.fetch_add(1, Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Strike category. Drives the oracle strategy label, simulated expected
/// return, and leverage choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrikeCategory {
    Arbitrage,
    Momentum,
    Volatility,
    Liquidity,
    Funding,
    Flash,
}

impl StrikeCategory {
    /// All categories, in ID-rotation order.
    pub const ALL: &'static [StrikeCategory] = &[
        StrikeCategory::Arbitrage,
        StrikeCategory::Momentum,
        StrikeCategory::Volatility,
        StrikeCategory::Liquidity,
        StrikeCategory::Funding,
        StrikeCategory::Flash,
    ];

    /// Category chosen for a given strike ID.
    pub fn for_strike(id: u64) -> Self {
        Self::ALL[(id % Self::ALL.len() as u64) as usize]
    }

    /// Strategy label passed to the analysis oracle.
    pub fn strategy_label(&self) -> &'static str {
        match self {
            StrikeCategory::Arbitrage => "MacroArbitrage",
            StrikeCategory::Momentum => "MacroMomentum",
            StrikeCategory::Volatility => "MacroVolatility",
            StrikeCategory::Liquidity => "MacroLiquidity",
            StrikeCategory::Funding => "MacroFunding",
            StrikeCategory::Flash => "MacroFlash",
        }
    }

    /// Expected return used when synthesising simulated strikes.
    pub fn simulated_expected_return(&self) -> f64 {
        match self {
            StrikeCategory::Arbitrage => 0.005,
            StrikeCategory::Momentum => 0.022,
            StrikeCategory::Volatility => 0.032,
            StrikeCategory::Liquidity => 0.035,
            StrikeCategory::Funding => 0.042,
            StrikeCategory::Flash => 0.059,
        }
    }

    /// Whether this category trades at the upper leverage bound.
    pub fn uses_max_leverage(&self) -> bool {
        matches!(self, StrikeCategory::Momentum | StrikeCategory::Volatility)
    }
}

impl fmt::Display for StrikeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrikeCategory::Arbitrage => write!(f, "Arbitrage"),
            StrikeCategory::Momentum => write!(f, "Momentum"),
            StrikeCategory::Volatility => write!(f, "Volatility"),
            StrikeCategory::Liquidity => write!(f, "Liquidity"),
            StrikeCategory::Funding => write!(f, "Funding"),
            StrikeCategory::Flash => write!(f, "Flash"),
        }
    }
}

/// Parse a category name (case-insensitive, with or without the `Macro` prefix).
impl std::str::FromStr for StrikeCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        match lower.strip_prefix("macro").unwrap_or(&lower) {
            "arbitrage" | "arb" => Ok(StrikeCategory::Arbitrage),
            "momentum" => Ok(StrikeCategory::Momentum),
            "volatility" | "vol" => Ok(StrikeCategory::Volatility),
            "liquidity" => Ok(StrikeCategory::Liquidity),
            "funding" => Ok(StrikeCategory::Funding),
            "flash" => Ok(StrikeCategory::Flash),
            _ => Err(anyhow::anyhow!("Unknown strike category: {s}")),
        }
    }
}

/// Strike lifecycle status.
///
/// `Targeting → Striking → {Hit, Miss, Aborted}`. `Targeting` may also go
/// straight to `Aborted` when sizing or pair resolution fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrikeStatus {
    Targeting,
    Striking,
    Hit,
    Miss,
    Aborted,
}

impl StrikeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StrikeStatus::Hit | StrikeStatus::Miss | StrikeStatus::Aborted)
    }
}

impl fmt::Display for StrikeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrikeStatus::Targeting => write!(f, "TARGETING"),
            StrikeStatus::Striking => write!(f, "STRIKING"),
            StrikeStatus::Hit => write!(f, "HIT"),
            StrikeStatus::Miss => write!(f, "MISS"),
            StrikeStatus::Aborted => write!(f, "ABORTED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Strike
// ---------------------------------------------------------------------------

/// One candidate or placed trade.
///
/// Created by a strike source in `Targeting`; mutated only by the executor
/// through the transition methods below; frozen once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strike {
    pub id: u64,
    pub symbol: String,
    pub category: StrikeCategory,
    pub entry_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    /// Confidence in [0, 1] (precision-adjusted when analysis-driven).
    pub confidence: f64,
    /// Expected fractional return.
    pub expected_return: f64,
    pub max_exposure: Duration,
    /// Intended leverage, set at sizing time.
    pub leverage: u32,
    /// Leveraged position size in USD, set at sizing time.
    pub position_size: f64,
    pub created_at: DateTime<Utc>,
    pub status: StrikeStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
}

impl fmt::Display for Strike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} [{}] entry={:.4} target={:.4} stop={:.4} conf={:.0}% {}x {}",
            self.id,
            self.symbol,
            self.category,
            self.entry_price,
            self.target_price,
            self.stop_loss,
            self.confidence * 100.0,
            self.leverage,
            self.status,
        )
    }
}

impl Strike {
    /// Stop-loss distance below entry, as a fraction.
    pub const STOP_LOSS_FRACTION: f64 = 0.02;

    /// Build a fresh strike in `Targeting` with target and stop derived from
    /// the entry price and expected return.
    pub fn new(
        id: u64,
        symbol: impl Into<String>,
        category: StrikeCategory,
        entry_price: f64,
        confidence: f64,
        expected_return: f64,
        max_exposure: Duration,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            category,
            entry_price,
            target_price: entry_price * (1.0 + expected_return),
            stop_loss: entry_price * (1.0 - Self::STOP_LOSS_FRACTION),
            confidence,
            expected_return,
            max_exposure,
            leverage: 1,
            position_size: 0.0,
            created_at: Utc::now(),
            status: StrikeStatus::Targeting,
            resolved_at: None,
            exit_price: None,
            pnl: None,
        }
    }

    /// `Targeting → Striking`, recording the computed sizing.
    pub fn begin(&mut self, position_size: f64, leverage: u32) -> Result<(), TradeError> {
        self.transition(StrikeStatus::Striking)?;
        self.position_size = position_size;
        self.leverage = leverage;
        Ok(())
    }

    /// `Striking → Hit | Miss`. Non-negative P&L is a hit.
    pub fn resolve(&mut self, exit_price: f64, pnl: f64) -> Result<(), TradeError> {
        let to = if pnl >= 0.0 { StrikeStatus::Hit } else { StrikeStatus::Miss };
        self.resolve_as(to, exit_price, pnl)
    }

    /// `Striking → Hit | Miss` with an explicitly drawn outcome.
    pub fn resolve_as(
        &mut self,
        to: StrikeStatus,
        exit_price: f64,
        pnl: f64,
    ) -> Result<(), TradeError> {
        if !matches!(to, StrikeStatus::Hit | StrikeStatus::Miss) {
            return Err(TradeError::InvalidTransition { from: self.status, to });
        }
        self.transition(to)?;
        self.exit_price = Some(exit_price);
        self.pnl = Some(pnl);
        self.resolved_at = Some(Utc::now());
        Ok(())
    }

    /// Any non-terminal state → `Aborted`. No P&L is recorded.
    pub fn abort(&mut self) -> Result<(), TradeError> {
        self.transition(StrikeStatus::Aborted)?;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, to: StrikeStatus) -> Result<(), TradeError> {
        let allowed = match (self.status, to) {
            (StrikeStatus::Targeting, StrikeStatus::Striking) => true,
            (StrikeStatus::Striking, StrikeStatus::Hit | StrikeStatus::Miss) => true,
            (from, StrikeStatus::Aborted) => !from.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(TradeError::InvalidTransition { from: self.status, to });
        }
        self.status = to;
        Ok(())
    }

    /// Helper to build a test strike with sensible defaults.
    #[cfg(test)]
    pub fn sample(category: StrikeCategory, confidence: f64) -> Self {
        Strike::new(
            next_strike_id(),
            "WETH/USDC",
            category,
            3000.0,
            confidence,
            category.simulated_expected_return(),
            Duration::from_millis(30_000),
        )
    }
}

// ---------------------------------------------------------------------------
// Analysis oracle response
// ---------------------------------------------------------------------------

/// Oracle go/no-go recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Execute,
    Wait,
    /// Any label the oracle emits that we don't recognise. Never executes.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Execute => write!(f, "EXECUTE"),
            Recommendation::Wait => write!(f, "WAIT"),
            Recommendation::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Structured output of the analysis oracle. Read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub price: f64,
    pub confidence: f64,
    pub expected_return: f64,
    #[serde(default)]
    pub volatility: f64,
    #[serde(default)]
    pub momentum: f64,
    #[serde(default)]
    pub liquidity: f64,
    pub precision_score: f64,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub timestamp: i64,
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {:.4} conf={:.0}% precision={:.2} er={:.2}% -> {}",
            self.symbol,
            self.price,
            self.confidence * 100.0,
            self.precision_score,
            self.expected_return * 100.0,
            self.recommendation,
        )
    }
}

impl AnalysisResult {
    /// Raw confidence scaled by the oracle's precision score.
    pub fn adjusted_confidence(&self) -> f64 {
        self.confidence * self.precision_score
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Trade-level error taxonomy.
///
/// `AnalysisUnavailable` and `BelowThreshold` are routine skips. The rest
/// terminate the strike they occur on; `Configuration` aborts the process.
#[derive(Debug, thiserror::Error)]
pub enum TradeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    #[error("Below threshold: {recommendation} conf={adjusted_confidence:.2} (min {threshold:.2})")]
    BelowThreshold {
        recommendation: Recommendation,
        adjusted_confidence: f64,
        threshold: f64,
    },

    #[error("Execution failed: {0}")]
    ExecutionFailed(#[from] ExchangeError),

    #[error("No fill for order {order_id} within {waited:?}")]
    NoFill { order_id: String, waited: Duration },

    #[error("Invalid strike transition {from} -> {to}")]
    InvalidTransition { from: StrikeStatus, to: StrikeStatus },
}

impl TradeError {
    /// Routine outcomes: skip the candidate, no count, no penalty.
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            TradeError::AnalysisUnavailable(_) | TradeError::BelowThreshold { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
