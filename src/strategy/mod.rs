//! Strategy layer: strike generation, position sizing, and risk guards.
//!
//! A [`StrikeSource`] produces one [`Candidate`] per campaign iteration:
//! either a fresh strike in `Targeting`, or a routine skip that the
//! controller must not count as an attempted trade.

pub mod generator;
pub mod risk;
pub mod sizing;

use async_trait::async_trait;

use crate::types::{Strike, TradeError};

/// One iteration's output from a strike source.
#[derive(Debug)]
pub enum Candidate {
    Strike(Strike),
    /// Routine skip (`AnalysisUnavailable` / `BelowThreshold`), carried for
    /// observability.
    Skip(TradeError),
}

/// Produces candidate strikes.
#[async_trait]
pub trait StrikeSource: Send {
    async fn next(&mut self) -> Result<Candidate, TradeError>;

    /// Source identifier for logging.
    fn name(&self) -> &str;
}
