//! Strike generators.
//!
//! Symbol and category rotate with the strike ID. `SimulatedGenerator`
//! synthesises strikes from fixed tables for throughput testing and never
//! touches the oracle; `AnalysisGenerator` requires an accepted gateway
//! decision and otherwise yields a skip.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::debug;

use super::{Candidate, StrikeSource};
use crate::analysis::{AnalysisGateway, Decision, Evaluator};
use crate::types::{next_strike_id, Strike, StrikeCategory, TradeError};

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Traded symbols with their simulated base prices.
pub const SYMBOLS: &[(&str, f64)] = &[
    ("WETH/USDC", 3000.0),
    ("WBTC/USDC", 45000.0),
    ("LINK/USDC", 15.50),
    ("UNI/USDC", 8.50),
    ("AAVE/USDC", 120.0),
    ("CRV/USDC", 0.85),
    ("USDC/USDT", 1.00),
    ("DAI/USDC", 1.00),
];

/// Maximum time a strike may hold exposure.
pub const DEFAULT_MAX_EXPOSURE: Duration = Duration::from_millis(30_000);

/// Simulated confidence is drawn uniformly from this range.
pub const SIMULATED_CONFIDENCE: std::ops::Range<f64> = 0.80..0.95;

fn symbol_for(id: u64) -> (&'static str, f64) {
    SYMBOLS[(id % SYMBOLS.len() as u64) as usize]
}

// ---------------------------------------------------------------------------
// Simulated
// ---------------------------------------------------------------------------

/// Deterministic-table strike synthesiser. Load/throughput testing only.
pub struct SimulatedGenerator {
    rng: StdRng,
    max_exposure: Duration,
}

impl SimulatedGenerator {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            max_exposure: DEFAULT_MAX_EXPOSURE,
        }
    }

    /// Build the strike for a given ID.
    pub fn generate(&mut self, id: u64) -> Strike {
        let (symbol, base_price) = symbol_for(id);
        let category = StrikeCategory::for_strike(id);
        let confidence = self.rng.gen_range(SIMULATED_CONFIDENCE);
        Strike::new(
            id,
            symbol,
            category,
            base_price,
            confidence,
            category.simulated_expected_return(),
            self.max_exposure,
        )
    }
}

#[async_trait]
impl StrikeSource for SimulatedGenerator {
    async fn next(&mut self) -> Result<Candidate, TradeError> {
        Ok(Candidate::Strike(self.generate(next_strike_id())))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

// ---------------------------------------------------------------------------
// Analysis-driven
// ---------------------------------------------------------------------------

/// Builds strikes from accepted oracle evaluations.
pub struct AnalysisGenerator<E> {
    gateway: AnalysisGateway<E>,
    max_exposure: Duration,
}

impl<E: Evaluator> AnalysisGenerator<E> {
    pub fn new(gateway: AnalysisGateway<E>) -> Self {
        Self {
            gateway,
            max_exposure: DEFAULT_MAX_EXPOSURE,
        }
    }

    pub async fn generate(&self, id: u64) -> Candidate {
        let (symbol, _) = symbol_for(id);
        let category = StrikeCategory::for_strike(id);

        match self.gateway.evaluate(symbol, category).await {
            Decision::Accept {
                analysis,
                adjusted_confidence,
            } => Candidate::Strike(Strike::new(
                id,
                symbol,
                category,
                analysis.price,
                adjusted_confidence,
                analysis.expected_return,
                self.max_exposure,
            )),
            Decision::Skip(reason) => {
                debug!(strike_id = id, symbol, category = %category, reason = %reason, "Candidate skipped");
                Candidate::Skip(reason)
            }
        }
    }
}

#[async_trait]
impl<E: Evaluator> StrikeSource for AnalysisGenerator<E> {
    async fn next(&mut self) -> Result<Candidate, TradeError> {
        Ok(self.generate(next_strike_id()).await)
    }

    fn name(&self) -> &str {
        "analysis"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalysisResult, Recommendation, StrikeStatus};

    #[test]
    fn test_simulated_strike_from_tables() {
        let mut generator = SimulatedGenerator::new(Some(7));
        // id 9 → symbol index 1, category index 3
        let s = generator.generate(9);
        assert_eq!(s.symbol, "WBTC/USDC");
        assert_eq!(s.category, StrikeCategory::Liquidity);
        assert_eq!(s.entry_price, 45000.0);
        assert_eq!(s.expected_return, 0.035);
        assert!((s.target_price - 45000.0 * 1.035).abs() < 1e-6);
        assert!((s.stop_loss - 45000.0 * 0.98).abs() < 1e-6);
        assert_eq!(s.status, StrikeStatus::Targeting);
    }

    #[test]
    fn test_simulated_confidence_bounds() {
        let mut generator = SimulatedGenerator::new(Some(42));
        for id in 0..1_000 {
            let s = generator.generate(id);
            assert!(s.confidence >= 0.80 && s.confidence < 0.95, "conf {}", s.confidence);
        }
    }

    #[test]
    fn test_seeded_generators_agree() {
        let mut a = SimulatedGenerator::new(Some(3));
        let mut b = SimulatedGenerator::new(Some(3));
        for id in 0..20 {
            assert_eq!(a.generate(id).confidence, b.generate(id).confidence);
        }
    }

    #[tokio::test]
    async fn test_simulated_ids_are_unique() {
        let mut generator = SimulatedGenerator::new(None);
        let mut ids = Vec::new();
        for _ in 0..50 {
            if let Candidate::Strike(s) = generator.next().await.unwrap() {
                ids.push(s.id);
            }
        }
        let mut sorted = ids.clone();
        sorted.dedup();
        assert_eq!(sorted.len(), 50);
        assert!(ids.windows(2).all(|w| w[1] > w[0]));
    }

    struct StubEvaluator {
        recommendation: Recommendation,
        precision: f64,
    }

    #[async_trait]
    impl Evaluator for StubEvaluator {
        async fn evaluate(&self, symbol: &str, _category: StrikeCategory) -> Result<AnalysisResult, TradeError> {
            Ok(AnalysisResult {
                symbol: symbol.to_string(),
                price: 101.0,
                confidence: 0.9,
                expected_return: 0.01,
                volatility: 0.0,
                momentum: 0.0,
                liquidity: 0.0,
                precision_score: self.precision,
                recommendation: self.recommendation,
                timestamp: 0,
            })
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_analysis_strike_uses_adjusted_confidence() {
        let generator = AnalysisGenerator::new(AnalysisGateway::new(
            StubEvaluator { recommendation: Recommendation::Execute, precision: 0.95 },
            0.80,
        ));
        match generator.generate(0).await {
            Candidate::Strike(s) => {
                assert_eq!(s.symbol, "WETH/USDC");
                assert_eq!(s.entry_price, 101.0);
                assert!((s.confidence - 0.855).abs() < 1e-9);
                assert!((s.target_price - 102.01).abs() < 1e-9);
            }
            other => panic!("expected strike, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_analysis_wait_yields_skip() {
        let generator = AnalysisGenerator::new(AnalysisGateway::new(
            StubEvaluator { recommendation: Recommendation::Wait, precision: 1.0 },
            0.80,
        ));
        assert!(matches!(generator.generate(0).await, Candidate::Skip(e) if e.is_routine()));
    }
}
