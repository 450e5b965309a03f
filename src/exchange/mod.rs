//! Exchange integration.
//!
//! Defines the `Exchange` trait the live executor trades through, the
//! exchange error type, and the retry policy wrapped around every private
//! API call. The Kraken implementation lives in [`kraken`]; request
//! signing in [`signer`].

pub mod kraken;
pub mod signer;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Attempts per private API call.
pub const MAX_ATTEMPTS: u32 = 3;

/// Linear backoff step: the wait after attempt `n` is `n × BACKOFF_STEP`.
pub const BACKOFF_STEP: Duration = Duration::from_millis(500);

/// Run `op` up to [`MAX_ATTEMPTS`] times, sleeping `attempt × 500ms`
/// between attempts. Only retryable errors (transport / HTTP) are retried;
/// exchange rejections and malformed responses return immediately.
pub async fn with_retry<T, F, Fut>(operation: &str, mut op: F) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                let delay = BACKOFF_STEP * attempt;
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable exchange error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Order types
// ---------------------------------------------------------------------------

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fill progress of an order. Both fields are absent until the exchange
/// reports a non-zero value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFill {
    pub volume_executed: Option<Decimal>,
    pub average_price: Option<Decimal>,
}

impl OrderFill {
    pub fn is_filled(&self) -> bool {
        self.volume_executed.is_some_and(|v| v > Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Exchange-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Connection, timeout, or body read failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Well-formed response carrying exchange-side errors. Terminal.
    #[error("Exchange rejected request: {}", .0.join(", "))]
    Rejected(Vec<String>),

    #[error("Invalid order size: notional={notional} price={price}")]
    InvalidSize { notional: f64, price: f64 },

    #[error("Malformed exchange response: {0}")]
    MalformedResponse(String),

    #[error("No exchange pair for symbol {0}")]
    UnknownPair(String),
}

impl ExchangeError {
    /// Whether the retry policy should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Transport(_) | ExchangeError::Http { .. })
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ExchangeError::Http {
                status: status.as_u16(),
                body: e.to_string(),
            },
            None => ExchangeError::Transport(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Exchange trait
// ---------------------------------------------------------------------------

/// Authenticated order operations against a spot exchange.
///
/// Implementations apply [`with_retry`] to each call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Map an internal symbol (e.g. `WETH/USDC`) to the exchange pair code.
    fn pair_for(&self, symbol: &str) -> Option<String>;

    /// Submit a market order for `notional_usd` worth of the base asset,
    /// converted to volume at `reference_price`. Returns the order ID.
    async fn place_order(
        &self,
        pair: &str,
        side: OrderSide,
        notional_usd: f64,
        reference_price: f64,
    ) -> Result<String, ExchangeError>;

    /// Query executed volume and average fill price.
    async fn query_order(&self, order_id: &str) -> Result<OrderFill, ExchangeError>;

    /// Market-sell a previously acquired volume. Returns the order ID.
    async fn place_exit(&self, pair: &str, volume: Decimal) -> Result<String, ExchangeError>;

    /// Cancel an outstanding order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
