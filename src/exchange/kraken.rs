//! Kraken spot exchange integration.
//!
//! Private REST API, form-encoded POST bodies, JSON responses.
//!
//! Auth headers: `API-Key: {key}`, `API-Sign: {signature}` (see [`super::signer`]).
//! Every body carries a `nonce` that must strictly increase per key.
//!
//! Endpoints used:
//! - `/0/private/AddOrder`: `pair`, `type`, `ordertype=market`, `volume`
//! - `/0/private/QueryOrders`: `txid`
//! - `/0/private/CancelOrder`: `txid`

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use super::signer::{NonceSource, Signer};
use super::{with_retry, Exchange, ExchangeError, OrderFill, OrderSide};
use crate::types::TradeError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.kraken.com";
const ADD_ORDER_PATH: &str = "/0/private/AddOrder";
const QUERY_ORDERS_PATH: &str = "/0/private/QueryOrders";
const CANCEL_ORDER_PATH: &str = "/0/private/CancelOrder";

/// Per-request HTTP timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Internal symbol → Kraken pair code.
const PAIRS: &[(&str, &str)] = &[
    ("WETH/USDC", "ETHUSD"),
    ("WBTC/USDC", "XBTUSD"),
    ("LINK/USDC", "LINKUSD"),
    ("UNI/USDC", "UNIUSD"),
    ("AAVE/USDC", "AAVEUSD"),
    ("CRV/USDC", "CRVUSD"),
    ("USDC/USDT", "USDCUSD"),
    ("DAI/USDC", "DAIUSD"),
];

pub fn kraken_pair(symbol: &str) -> Option<&'static str> {
    PAIRS.iter().find(|(s, _)| *s == symbol).map(|(_, p)| *p)
}

// ---------------------------------------------------------------------------
// Kraken API types
// ---------------------------------------------------------------------------

/// Every private endpoint wraps its payload in `{ error: [...], result: {...} }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AddOrderResult {
    #[serde(default)]
    txid: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OrderInfo {
    #[serde(default)]
    vol_exec: Option<String>,
    #[serde(default)]
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CancelResult {
    #[serde(default)]
    count: u32,
}

/// Unwrap a response envelope. A non-empty `error` array is a terminal
/// rejection regardless of `result`.
fn parse_envelope<T: DeserializeOwned>(body: &str) -> Result<T, ExchangeError> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| ExchangeError::MalformedResponse(e.to_string()))?;
    if !envelope.error.is_empty() {
        return Err(ExchangeError::Rejected(envelope.error));
    }
    envelope
        .result
        .ok_or_else(|| ExchangeError::MalformedResponse("missing result".into()))
}

fn parse_order_id(body: &str) -> Result<String, ExchangeError> {
    let result: AddOrderResult = parse_envelope(body)?;
    result
        .txid
        .into_iter()
        .next()
        .ok_or_else(|| ExchangeError::MalformedResponse("AddOrder returned no txid".into()))
}

/// Extract fill progress for `order_id` from a QueryOrders response.
/// Zero or unparseable amounts are reported as absent.
fn parse_order_fill(body: &str, order_id: &str) -> Result<OrderFill, ExchangeError> {
    let mut orders: HashMap<String, OrderInfo> = parse_envelope(body)?;
    let Some(info) = orders.remove(order_id) else {
        return Ok(OrderFill::default());
    };
    let positive = |s: Option<String>| {
        s.and_then(|v| v.parse::<Decimal>().ok())
            .filter(|d| *d > Decimal::ZERO)
    };
    Ok(OrderFill {
        volume_executed: positive(info.vol_exec),
        average_price: positive(info.price),
    })
}

/// USD notional → base volume at the reference price, 8 decimal places.
pub fn notional_to_volume(notional_usd: f64, reference_price: f64) -> Result<String, ExchangeError> {
    if !(notional_usd > 0.0 && reference_price > 0.0)
        || !notional_usd.is_finite()
        || !reference_price.is_finite()
    {
        return Err(ExchangeError::InvalidSize {
            notional: notional_usd,
            price: reference_price,
        });
    }
    Ok(format!("{:.8}", notional_usd / reference_price))
}

fn encode_form(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct KrakenClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    signer: Signer,
    nonces: NonceSource,
}

impl KrakenClient {
    /// Build a client. Fails with a configuration error if the secret
    /// can't be decoded.
    pub fn new(
        api_key: SecretString,
        api_secret: &SecretString,
        base_url: Option<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, TradeError> {
        let signer = Signer::new(api_secret)?;
        let http = Client::builder()
            .timeout(request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
            .build()
            .map_err(|e| TradeError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            signer,
            nonces: NonceSource::new(),
        })
    }

    /// One signed POST. A fresh nonce is drawn per call, so retries never
    /// replay a nonce.
    async fn private_request(&self, path: &str, params: &[(&str, String)]) -> Result<String, ExchangeError> {
        let nonce = self.nonces.next();
        let mut form = vec![("nonce", nonce.to_string())];
        form.extend(params.iter().cloned());
        let body = encode_form(&form);
        let signature = self.signer.sign(path, nonce, &body);

        debug!(path, nonce, "Kraken private request");

        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("API-Key", self.api_key.expose_secret())
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body: text.chars().take(200).collect(),
            });
        }
        Ok(text)
    }

    async fn add_market_order(&self, pair: &str, side: OrderSide, volume: String) -> Result<String, ExchangeError> {
        let params = [
            ("pair", pair.to_string()),
            ("type", side.as_str().to_string()),
            ("ordertype", "market".to_string()),
            ("volume", volume),
        ];
        let body = with_retry("AddOrder", || self.private_request(ADD_ORDER_PATH, &params)).await?;
        parse_order_id(&body)
    }
}

#[async_trait]
impl Exchange for KrakenClient {
    fn pair_for(&self, symbol: &str) -> Option<String> {
        kraken_pair(symbol).map(str::to_string)
    }

    async fn place_order(
        &self,
        pair: &str,
        side: OrderSide,
        notional_usd: f64,
        reference_price: f64,
    ) -> Result<String, ExchangeError> {
        let volume = notional_to_volume(notional_usd, reference_price)?;
        let order_id = self.add_market_order(pair, side, volume.clone()).await?;
        info!(
            pair,
            side = %side,
            notional = format!("${:.2}", notional_usd),
            reference_price,
            volume = %volume,
            order_id = %order_id,
            "Order placed"
        );
        Ok(order_id)
    }

    async fn query_order(&self, order_id: &str) -> Result<OrderFill, ExchangeError> {
        let params = [("txid", order_id.to_string())];
        let body = with_retry("QueryOrders", || self.private_request(QUERY_ORDERS_PATH, &params)).await?;
        parse_order_fill(&body, order_id)
    }

    async fn place_exit(&self, pair: &str, volume: Decimal) -> Result<String, ExchangeError> {
        if volume <= Decimal::ZERO {
            return Err(ExchangeError::InvalidSize { notional: 0.0, price: 0.0 });
        }
        let volume = volume.round_dp(8).to_string();
        let order_id = self.add_market_order(pair, OrderSide::Sell, volume.clone()).await?;
        info!(pair, volume = %volume, order_id = %order_id, "Exit order placed");
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        let params = [("txid", order_id.to_string())];
        let body = with_retry("CancelOrder", || self.private_request(CANCEL_ORDER_PATH, &params)).await?;
        let result: CancelResult = parse_envelope(&body)?;
        info!(order_id, cancelled = result.count, "Order cancelled");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
