//! Strike executor.
//!
//! Sizes a strike, walks it through `Targeting → Striking → terminal`, and
//! returns the realised P&L as a [`StrikeOutcome`]. Two implementations:
//!
//! - [`LiveExecutor`]: place → poll fill → hold → exit → poll exit price,
//!   against a real [`Exchange`].
//! - [`SimulatedExecutor`]: a probabilistic draw against the strike's
//!   confidence with fixed TP/SL/fee percentages. Throughput and regression
//!   testing only; it is a separate type so it can never stand in for the
//!   live path.
//!
//! An `Err` return means the strike was aborted: no capital change, not a
//! completed trade.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::*;
use std::time::Duration;
use tracing::{error, info, warn};

use super::accountant::{f64_usd_to_cents, usd_to_cents, StrikeOutcome};
use crate::exchange::{Exchange, ExchangeError, OrderFill, OrderSide};
use crate::strategy::sizing::PositionSizer;
use crate::types::{Strike, StrikeStatus, TradeError};

/// Executes one strike to a terminal state.
#[async_trait]
pub trait StrikeExecutor: Send {
    /// Execute `strike` against the current capital. On `Ok` the strike is
    /// `Hit` or `Miss`; on `Err` it is `Aborted`.
    async fn execute(&mut self, strike: &mut Strike, capital_cents: i64) -> Result<StrikeOutcome, TradeError>;

    /// Executor identifier for logging.
    fn name(&self) -> &str;
}

/// Abort a strike and pass the error through.
fn abort_with(strike: &mut Strike, err: TradeError) -> TradeError {
    if let Err(e) = strike.abort() {
        warn!(strike_id = strike.id, error = %e, "Abort on non-abortable strike");
    }
    err
}

// ---------------------------------------------------------------------------
// Live
// ---------------------------------------------------------------------------

/// Timing of the live place → poll → hold → exit sequence.
#[derive(Debug, Clone)]
pub struct LiveTiming {
    pub poll_interval: Duration,
    pub fill_timeout: Duration,
    /// Blocking hold between fill and exit. Not cancellable.
    pub hold: Duration,
    pub exit_timeout: Duration,
}

impl Default for LiveTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            fill_timeout: Duration::from_secs(30),
            hold: Duration::from_secs(20),
            exit_timeout: Duration::from_secs(30),
        }
    }
}

pub struct LiveExecutor<X> {
    exchange: X,
    sizer: PositionSizer,
    /// USD notional of each buy order.
    order_usd_size: f64,
    timing: LiveTiming,
}

impl<X: Exchange> LiveExecutor<X> {
    pub fn new(exchange: X, sizer: PositionSizer, order_usd_size: f64, timing: LiveTiming) -> Self {
        Self {
            exchange,
            sizer,
            order_usd_size,
            timing,
        }
    }

    pub fn exchange(&self) -> &X {
        &self.exchange
    }

    /// Poll until the order reports executed volume, or `timeout` elapses.
    /// Query errors are logged and polling continues.
    async fn wait_for_fill(&self, order_id: &str, timeout: Duration) -> Option<OrderFill> {
        let poll = async {
            let mut ticker = tokio::time::interval(self.timing.poll_interval);
            loop {
                ticker.tick().await;
                match self.exchange.query_order(order_id).await {
                    Ok(fill) if fill.is_filled() => return fill,
                    Ok(_) => {}
                    Err(e) => warn!(order_id, error = %e, "Order query failed"),
                }
            }
        };
        tokio::time::timeout(timeout, poll).await.ok()
    }

    async fn run(&self, strike: &mut Strike, pair: &str) -> Result<(Decimal, Decimal, Decimal), TradeError> {
        // 1. Entry
        let buy_id = self
            .exchange
            .place_order(pair, OrderSide::Buy, self.order_usd_size, strike.entry_price)
            .await?;
        info!(
            strike_id = strike.id,
            pair,
            notional = format!("${:.2}", self.order_usd_size),
            reference_price = strike.entry_price,
            order_id = %buy_id,
            "LIVE ORDER"
        );

        // 2. Wait for fill
        let Some(fill) = self.wait_for_fill(&buy_id, self.timing.fill_timeout).await else {
            // The order may still be resting on the book.
            if let Err(e) = self.exchange.cancel_order(&buy_id).await {
                error!(order_id = %buy_id, error = %e, "Cancel after no-fill failed; order left outstanding");
            }
            return Err(TradeError::NoFill {
                order_id: buy_id,
                waited: self.timing.fill_timeout,
            });
        };
        let volume = fill.volume_executed.unwrap_or_default();
        let entry = fill
            .average_price
            .or_else(|| Decimal::from_f64(strike.entry_price))
            .unwrap_or_default();

        // 3. Hold
        tokio::time::sleep(self.timing.hold).await;

        // 4. Exit, falling back to the entry price if the exit fill never reports one.
        let sell_id = self.exchange.place_exit(pair, volume).await.map_err(|e| {
            error!(order_id = %buy_id, volume = %volume, error = %e, "Exit failed; position left open");
            e
        })?;
        let exit = match self.wait_for_fill(&sell_id, self.timing.exit_timeout).await {
            Some(OrderFill { average_price: Some(p), .. }) => p,
            _ => {
                warn!(order_id = %sell_id, "No exit price reported; using entry price");
                entry
            }
        };

        Ok((entry, exit, volume))
    }
}

#[async_trait]
impl<X: Exchange> StrikeExecutor for LiveExecutor<X> {
    async fn execute(&mut self, strike: &mut Strike, capital_cents: i64) -> Result<StrikeOutcome, TradeError> {
        let Some(pair) = self.exchange.pair_for(&strike.symbol) else {
            let err = ExchangeError::UnknownPair(strike.symbol.clone()).into();
            return Err(abort_with(strike, err));
        };

        let sized = self.sizer.size(capital_cents, strike.confidence, strike.category);
        strike.begin(sized.size_usd, sized.leverage)?;

        let (entry, exit, volume) = match self.run(strike, &pair).await {
            Ok(r) => r,
            Err(e) => return Err(abort_with(strike, e)),
        };

        let pnl = (exit - entry) * volume;
        let pnl_cents = usd_to_cents(pnl);
        strike.resolve(exit.to_f64().unwrap_or(0.0), pnl.to_f64().unwrap_or(0.0))?;

        info!(
            strike_id = strike.id,
            pair = %pair,
            filled = %volume,
            buy = %entry,
            sell = %exit,
            pnl = format!("${:.2}", pnl),
            status = %strike.status,
            "LIVE EXIT"
        );

        Ok(StrikeOutcome {
            strike_id: strike.id,
            pnl_cents,
            hit: strike.status == StrikeStatus::Hit,
        })
    }

    fn name(&self) -> &str {
        "live"
    }
}

// ---------------------------------------------------------------------------
// Simulated
// ---------------------------------------------------------------------------

/// Where the simulated take-profit comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TakeProfit {
    Fixed(f64),
    /// Use each strike's expected return.
    ExpectedReturn,
}

#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub round_trip_fee_pct: f64,
    pub take_profit: TakeProfit,
    pub stop_loss_pct: f64,
    /// Half-width of the uniform noise applied to the recorded exit price.
    pub price_noise_pct: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            round_trip_fee_pct: 0.0016,
            take_profit: TakeProfit::Fixed(0.003),
            stop_loss_pct: 0.0025,
            price_noise_pct: 0.02,
        }
    }
}

/// Simulated P&L in USD for a sized position.
///
/// Hit: `size × tp × leverage − fees`; miss: `−size × sl × leverage − fees`,
/// with `fees = size × round_trip_fee_pct`.
pub fn simulated_pnl(size_usd: f64, leverage: u32, take_profit_pct: f64, params: &SimulationParams, hit: bool) -> f64 {
    let fees = size_usd * params.round_trip_fee_pct;
    if hit {
        size_usd * take_profit_pct * leverage as f64 - fees
    } else {
        -(size_usd * params.stop_loss_pct * leverage as f64) - fees
    }
}

pub struct SimulatedExecutor {
    sizer: PositionSizer,
    params: SimulationParams,
    rng: StdRng,
}

impl SimulatedExecutor {
    pub fn new(sizer: PositionSizer, params: SimulationParams, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { sizer, params, rng }
    }

    /// Resolve a strike with a predetermined outcome.
    pub fn resolve(&mut self, strike: &mut Strike, capital_cents: i64, hit: bool) -> Result<StrikeOutcome, TradeError> {
        let sized = self.sizer.size(capital_cents, strike.confidence, strike.category);
        strike.begin(sized.size_usd, sized.leverage)?;

        let tp = match self.params.take_profit {
            TakeProfit::Fixed(p) => p,
            TakeProfit::ExpectedReturn => strike.expected_return,
        };
        let pnl = simulated_pnl(sized.size_usd, sized.leverage, tp, &self.params, hit);

        let noise = if self.params.price_noise_pct > 0.0 {
            self.rng.gen_range(-self.params.price_noise_pct..self.params.price_noise_pct)
        } else {
            0.0
        };
        let exit_price = strike.entry_price * (1.0 + noise);

        let status = if hit { StrikeStatus::Hit } else { StrikeStatus::Miss };
        strike.resolve_as(status, exit_price, pnl)?;

        Ok(StrikeOutcome {
            strike_id: strike.id,
            pnl_cents: f64_usd_to_cents(pnl),
            hit,
        })
    }
}

#[async_trait]
impl StrikeExecutor for SimulatedExecutor {
    async fn execute(&mut self, strike: &mut Strike, capital_cents: i64) -> Result<StrikeOutcome, TradeError> {
        let hit = self.rng.gen::<f64>() < strike.confidence;
        self.resolve(strike, capital_cents, hit)
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockExchange;
    use crate::strategy::sizing::SizingConfig;
    use crate::types::StrikeCategory;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn sizer() -> PositionSizer {
        PositionSizer::new(SizingConfig::default()).unwrap()
    }

    // -- Simulated --

    #[test]
    fn test_simulated_hit_scenario() {
        // $100k, conf 0.9, strike force 0.15, leverage 3 → size $40,500
        // pnl = 40,500 × 0.003 × 3 − 40,500 × 0.0016 = 364.50 − 64.80 = 299.70
        let mut exec = SimulatedExecutor::new(sizer(), SimulationParams::default(), Some(1));
        let mut strike = Strike::sample(StrikeCategory::Arbitrage, 0.90);

        let outcome = exec.resolve(&mut strike, 10_000_000, true).unwrap();

        assert_eq!(outcome.pnl_cents, 29_970);
        assert!(outcome.hit);
        assert_eq!(strike.status, StrikeStatus::Hit);
        assert_eq!(strike.leverage, 3);
        assert!((strike.position_size - 40_500.0).abs() < 1e-6);
        let exit = strike.exit_price.unwrap();
        assert!(exit >= 3000.0 * 0.98 && exit <= 3000.0 * 1.02);
    }

    #[test]
    fn test_simulated_miss() {
        // −(40,500 × 0.0025 × 3) − 64.80 = −303.75 − 64.80 = −368.55
        let mut exec = SimulatedExecutor::new(sizer(), SimulationParams::default(), Some(1));
        let mut strike = Strike::sample(StrikeCategory::Arbitrage, 0.90);
        let outcome = exec.resolve(&mut strike, 10_000_000, false).unwrap();
        assert_eq!(outcome.pnl_cents, -36_855);
        assert_eq!(strike.status, StrikeStatus::Miss);
    }

    #[test]
    fn test_expected_return_take_profit() {
        let params = SimulationParams {
            take_profit: TakeProfit::ExpectedReturn,
            ..SimulationParams::default()
        };
        let pnl = simulated_pnl(1_000.0, 3, 0.022, &params, true);
        assert!((pnl - (1_000.0 * 0.022 * 3.0 - 1.6)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_simulated_hit_rate_tracks_confidence() {
        let mut exec = SimulatedExecutor::new(sizer(), SimulationParams::default(), Some(99));
        let mut hits = 0;
        for _ in 0..2_000 {
            let mut strike = Strike::sample(StrikeCategory::Funding, 0.85);
            if exec.execute(&mut strike, 10_000_000).await.unwrap().hit {
                hits += 1;
            }
        }
        let rate = hits as f64 / 2_000.0;
        assert!((0.80..0.90).contains(&rate), "hit rate {rate}");
    }

    // -- Live --

    fn filled(volume: Decimal, price: Decimal) -> OrderFill {
        OrderFill {
            volume_executed: Some(volume),
            average_price: Some(price),
        }
    }

    fn live(exchange: MockExchange) -> LiveExecutor<MockExchange> {
        LiveExecutor::new(exchange, sizer(), 25.0, LiveTiming::default())
    }

    fn with_pairs(mock: &mut MockExchange) {
        mock.expect_pair_for()
            .returning(|s| crate::exchange::kraken::kraken_pair(s).map(str::to_string));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_round_trip_hit() {
        let mut mock = MockExchange::new();
        with_pairs(&mut mock);
        mock.expect_place_order()
            .withf(|pair, side, notional, price| {
                pair == "ETHUSD" && *side == OrderSide::Buy && *notional == 25.0 && *price == 3000.0
            })
            .times(1)
            .returning(|_, _, _, _| Ok("BUY-1".to_string()));

        let buy_polls = Arc::new(AtomicU32::new(0));
        let bp = buy_polls.clone();
        mock.expect_query_order().returning(move |id| {
            if id == "BUY-1" {
                // Two pending polls, then filled.
                if bp.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(OrderFill::default())
                } else {
                    Ok(filled(dec!(0.01), dec!(3000)))
                }
            } else {
                Ok(filled(dec!(0.01), dec!(3050)))
            }
        });
        mock.expect_place_exit()
            .withf(|pair, volume| pair == "ETHUSD" && *volume == dec!(0.01))
            .times(1)
            .returning(|_, _| Ok("SELL-1".to_string()));
        mock.expect_cancel_order().never();

        let mut exec = live(mock);
        let mut strike = Strike::sample(StrikeCategory::Momentum, 0.9);
        let outcome = exec.execute(&mut strike, 10_000_000).await.unwrap();

        // (3050 − 3000) × 0.01 = $0.50
        assert_eq!(outcome.pnl_cents, 50);
        assert!(outcome.hit);
        assert_eq!(strike.status, StrikeStatus::Hit);
        assert_eq!(strike.leverage, 5);
        assert_eq!(buy_polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_loss_is_miss() {
        let mut mock = MockExchange::new();
        with_pairs(&mut mock);
        mock.expect_place_order().returning(|_, _, _, _| Ok("BUY-2".to_string()));
        mock.expect_query_order().returning(|id| {
            if id == "BUY-2" {
                Ok(filled(dec!(0.5), dec!(120)))
            } else {
                Ok(filled(dec!(0.5), dec!(118.5)))
            }
        });
        mock.expect_place_exit().returning(|_, _| Ok("SELL-2".to_string()));

        let mut exec = live(mock);
        let mut strike = Strike::sample(StrikeCategory::Flash, 0.9);
        strike.symbol = "AAVE/USDC".into();
        let outcome = exec.execute(&mut strike, 10_000_000).await.unwrap();

        assert_eq!(outcome.pnl_cents, -75);
        assert!(!outcome.hit);
        assert_eq!(strike.status, StrikeStatus::Miss);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_no_fill_aborts_and_cancels() {
        let mut mock = MockExchange::new();
        with_pairs(&mut mock);
        mock.expect_place_order().returning(|_, _, _, _| Ok("BUY-3".to_string()));
        mock.expect_query_order().returning(|_| Ok(OrderFill::default()));
        mock.expect_place_exit().never();
        mock.expect_cancel_order()
            .withf(|id| id == "BUY-3")
            .times(1)
            .returning(|_| Ok(()));

        let start = tokio::time::Instant::now();
        let mut exec = live(mock);
        let mut strike = Strike::sample(StrikeCategory::Arbitrage, 0.9);
        let err = exec.execute(&mut strike, 10_000_000).await.unwrap_err();

        assert!(matches!(err, TradeError::NoFill { ref order_id, .. } if order_id == "BUY-3"));
        assert_eq!(strike.status, StrikeStatus::Aborted);
        assert!(strike.pnl.is_none());
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_exit_price_falls_back_to_entry() {
        let mut mock = MockExchange::new();
        with_pairs(&mut mock);
        mock.expect_place_order().returning(|_, _, _, _| Ok("BUY-4".to_string()));
        mock.expect_query_order().returning(|id| {
            if id == "BUY-4" {
                Ok(filled(dec!(2), dec!(15.5)))
            } else {
                Err(ExchangeError::Transport("timeout".into()))
            }
        });
        mock.expect_place_exit().returning(|_, _| Ok("SELL-4".to_string()));

        let mut exec = live(mock);
        let mut strike = Strike::sample(StrikeCategory::Liquidity, 0.9);
        strike.symbol = "LINK/USDC".into();
        let outcome = exec.execute(&mut strike, 10_000_000).await.unwrap();

        assert_eq!(outcome.pnl_cents, 0);
        assert!(outcome.hit);
        assert_eq!(strike.exit_price, Some(15.5));
    }

    #[tokio::test]
    async fn test_live_rejection_aborts() {
        let mut mock = MockExchange::new();
        with_pairs(&mut mock);
        mock.expect_place_order()
            .returning(|_, _, _, _| Err(ExchangeError::Rejected(vec!["EOrder:Insufficient funds".into()])));
        mock.expect_query_order().never();

        let mut exec = live(mock);
        let mut strike = Strike::sample(StrikeCategory::Arbitrage, 0.9);
        let err = exec.execute(&mut strike, 10_000_000).await.unwrap_err();

        assert!(matches!(err, TradeError::ExecutionFailed(ExchangeError::Rejected(_))));
        assert_eq!(strike.status, StrikeStatus::Aborted);
    }

    #[tokio::test]
    async fn test_live_unknown_pair_aborts() {
        let mut mock = MockExchange::new();
        with_pairs(&mut mock);
        mock.expect_place_order().never();

        let mut exec = live(mock);
        let mut strike = Strike::sample(StrikeCategory::Arbitrage, 0.9);
        strike.symbol = "PEPE/USDC".into();
        let err = exec.execute(&mut strike, 10_000_000).await.unwrap_err();

        assert!(matches!(err, TradeError::ExecutionFailed(ExchangeError::UnknownPair(_))));
        assert_eq!(strike.status, StrikeStatus::Aborted);
    }
}
