//! Market analysis gateway.
//!
//! Defines the `Evaluator` trait over the out-of-process analysis oracle and
//! the gateway that turns an evaluation into an accept/skip decision.
//! A strike is accepted only when the oracle says `EXECUTE` *and* the
//! precision-adjusted confidence clears the configured threshold.

pub mod oracle;

use async_trait::async_trait;
use tracing::debug;

use crate::types::{AnalysisResult, Recommendation, StrikeCategory, TradeError};

/// Default minimum precision-adjusted confidence.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.80;

/// Abstraction over the analysis oracle.
///
/// Implementors return `TradeError::AnalysisUnavailable` when the oracle
/// can't be reached or its output can't be parsed.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, symbol: &str, category: StrikeCategory) -> Result<AnalysisResult, TradeError>;

    /// Evaluator identifier for logging.
    fn name(&self) -> &str;
}

/// Outcome of a gateway evaluation.
#[derive(Debug)]
pub enum Decision {
    Accept {
        analysis: AnalysisResult,
        adjusted_confidence: f64,
    },
    /// The carried error is always routine (`AnalysisUnavailable` or
    /// `BelowThreshold`).
    Skip(TradeError),
}

impl Decision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept { .. })
    }
}

pub struct AnalysisGateway<E> {
    evaluator: E,
    min_confidence: f64,
}

impl<E: Evaluator> AnalysisGateway<E> {
    pub fn new(evaluator: E, min_confidence: f64) -> Self {
        Self { evaluator, min_confidence }
    }

    /// Evaluate a candidate and decide whether to strike.
    pub async fn evaluate(&self, symbol: &str, category: StrikeCategory) -> Decision {
        let analysis = match self.evaluator.evaluate(symbol, category).await {
            Ok(a) => a,
            Err(e) => {
                debug!(symbol, evaluator = self.evaluator.name(), error = %e, "Analysis unavailable");
                let e = match e {
                    TradeError::AnalysisUnavailable(_) => e,
                    other => TradeError::AnalysisUnavailable(other.to_string()),
                };
                return Decision::Skip(e);
            }
        };
        self.decide(analysis)
    }

    /// Apply the accept rule to an evaluation.
    pub fn decide(&self, analysis: AnalysisResult) -> Decision {
        let adjusted = analysis.adjusted_confidence();
        if analysis.recommendation == Recommendation::Execute && adjusted >= self.min_confidence {
            debug!(
                symbol = %analysis.symbol,
                adjusted_confidence = format!("{:.3}", adjusted),
                "Analysis accepted"
            );
            return Decision::Accept {
                analysis,
                adjusted_confidence: adjusted,
            };
        }

        debug!(
            symbol = %analysis.symbol,
            recommendation = %analysis.recommendation,
            adjusted_confidence = format!("{:.3}", adjusted),
            min = self.min_confidence,
            "Analysis below threshold"
        );
        Decision::Skip(TradeError::BelowThreshold {
            recommendation: analysis.recommendation,
            adjusted_confidence: adjusted,
            threshold: self.min_confidence,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
