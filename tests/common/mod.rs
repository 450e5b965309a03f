//! Deterministic fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use strike_engine::analysis::Evaluator;
use strike_engine::engine::accountant::StrikeOutcome;
use strike_engine::engine::executor::StrikeExecutor;
use strike_engine::exchange::{Exchange, ExchangeError, OrderFill, OrderSide};
use strike_engine::types::{AnalysisResult, Recommendation, Strike, StrikeCategory, TradeError};

pub fn analysis(recommendation: Recommendation, confidence: f64, precision: f64) -> AnalysisResult {
    AnalysisResult {
        symbol: "WETH/USDC".into(),
        price: 3000.0,
        confidence,
        expected_return: 0.01,
        volatility: 0.2,
        momentum: 0.1,
        liquidity: 0.9,
        precision_score: precision,
        recommendation,
        timestamp: 1_700_000_000,
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Replays scripted evaluations, then accepts everything.
pub struct ScriptedEvaluator {
    script: Mutex<VecDeque<Result<AnalysisResult, TradeError>>>,
}

impl ScriptedEvaluator {
    pub fn new(script: Vec<Result<AnalysisResult, TradeError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(&self, symbol: &str, _category: StrikeCategory) -> Result<AnalysisResult, TradeError> {
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            let mut a = analysis(Recommendation::Execute, 0.95, 0.95);
            a.symbol = symbol.to_string();
            Ok(a)
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// In-memory exchange. Buys fill at `entry` unless `fills` is false; exits
/// fill at `exit`. With `rejects` set every buy is refused.
pub struct FakeExchange {
    pub fills: bool,
    pub rejects: bool,
    pub entry: Decimal,
    pub exit: Decimal,
    pub volume: Decimal,
    pub placed: AtomicU32,
    pub exits: AtomicU32,
    pub cancelled: Mutex<Vec<String>>,
}

impl FakeExchange {
    pub fn new(fills: bool, entry: Decimal, exit: Decimal, volume: Decimal) -> Self {
        Self {
            fills,
            rejects: false,
            entry,
            exit,
            volume,
            placed: AtomicU32::new(0),
            exits: AtomicU32::new(0),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            rejects: true,
            ..Self::new(false, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
        }
    }
}

#[async_trait]
impl Exchange for FakeExchange {
    fn pair_for(&self, symbol: &str) -> Option<String> {
        strike_engine::exchange::kraken::kraken_pair(symbol).map(str::to_string)
    }

    async fn place_order(
        &self,
        _pair: &str,
        _side: OrderSide,
        _notional_usd: f64,
        _reference_price: f64,
    ) -> Result<String, ExchangeError> {
        let n = self.placed.fetch_add(1, Ordering::SeqCst);
        if self.rejects {
            return Err(ExchangeError::Rejected(vec!["EOrder:Insufficient funds".into()]));
        }
        Ok(format!("BUY-{n}"))
    }

    async fn query_order(&self, order_id: &str) -> Result<OrderFill, ExchangeError> {
        if order_id.starts_with("SELL") {
            return Ok(OrderFill {
                volume_executed: Some(self.volume),
                average_price: Some(self.exit),
            });
        }
        if self.fills {
            Ok(OrderFill {
                volume_executed: Some(self.volume),
                average_price: Some(self.entry),
            })
        } else {
            Ok(OrderFill::default())
        }
    }

    async fn place_exit(&self, _pair: &str, _volume: Decimal) -> Result<String, ExchangeError> {
        let n = self.exits.fetch_add(1, Ordering::SeqCst);
        Ok(format!("SELL-{n}"))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Applies a fixed P&L to every strike.
pub struct FixedPnlExecutor {
    pub pnl_cents: i64,
}

#[async_trait]
impl StrikeExecutor for FixedPnlExecutor {
    async fn execute(&mut self, strike: &mut Strike, _capital_cents: i64) -> Result<StrikeOutcome, TradeError> {
        strike.begin(1_000.0, 3)?;
        strike.resolve(strike.entry_price, self.pnl_cents as f64 / 100.0)?;
        Ok(StrikeOutcome {
            strike_id: strike.id,
            pnl_cents: self.pnl_cents,
            hit: self.pnl_cents >= 0,
        })
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
