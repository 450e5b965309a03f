//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads an optional `config.toml` into strongly-typed structs (every
//! section has defaults), then applies the operator environment overrides.
//! Exchange credentials are referenced by env-var name in the config and
//! resolved at runtime into `SecretString`s; their values never appear in
//! errors or logs.

use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::engine::campaign::CampaignConfig;
use crate::engine::executor::{LiveTiming, SimulationParams, TakeProfit};
use crate::strategy::risk::RiskConfig;
use crate::strategy::sizing::{RiskBudget, SizingConfig};

/// Which generator/executor pair drives the campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Table-driven strikes, simulated outcomes. Throughput testing only.
    #[default]
    Simulation,
    /// Oracle-driven strikes, simulated outcomes.
    Paper,
    /// Oracle-driven strikes, real exchange orders.
    Live,
}

impl RunMode {
    /// Target-capital and time-window stops apply outside simulation.
    pub fn production_stops(&self) -> bool {
        !matches!(self, RunMode::Simulation)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Simulation => write!(f, "simulation"),
            RunMode::Paper => write!(f, "paper"),
            RunMode::Live => write!(f, "live"),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub mode: RunMode,
    pub campaign: CampaignSection,
    pub strike: StrikeSection,
    pub simulation: SimulationSection,
    pub live: LiveSection,
    pub exchange: ExchangeSection,
    pub oracle: OracleSection,
    pub report: ReportSection,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CampaignSection {
    pub initial_capital: f64,
    pub target_capital: f64,
    pub total_trades: u64,
    pub campaign_days: f64,
    pub cooldown_ms: u64,
    pub progress_every: u64,
    /// Percent from peak; 0 disables the configurable drawdown stop.
    pub max_drawdown_pct: f64,
    pub max_consecutive_misses: u64,
    /// Execution failures in a row before an emergency stop.
    pub max_consecutive_aborts: u64,
}

impl Default for CampaignSection {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            target_capital: 118_500.0,
            total_trades: 2_500,
            campaign_days: 5.0,
            cooldown_ms: 1,
            progress_every: 100,
            max_drawdown_pct: 10.0,
            max_consecutive_misses: 20,
            max_consecutive_aborts: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StrikeSection {
    pub strike_force_pct: f64,
    pub min_leverage: u32,
    pub max_leverage: u32,
    pub min_confidence: f64,
    /// Percent of capital risked per trade (1.0 = 1%).
    pub risk_per_trade_pct: f64,
    /// Fixed RNG seed for reproducible simulation runs.
    pub seed: Option<u64>,
}

impl Default for StrikeSection {
    fn default() -> Self {
        Self {
            strike_force_pct: 0.15,
            min_leverage: 3,
            max_leverage: 5,
            min_confidence: 0.80,
            risk_per_trade_pct: 1.0,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationSection {
    pub round_trip_fee_pct: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub price_noise_pct: f64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            round_trip_fee_pct: 0.0016,
            take_profit_pct: 0.003,
            stop_loss_pct: 0.0025,
            price_noise_pct: 0.02,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LiveSection {
    pub order_usd_size: f64,
    pub poll_interval_secs: u64,
    pub fill_timeout_secs: u64,
    pub hold_secs: u64,
    pub exit_timeout_secs: u64,
}

impl Default for LiveSection {
    fn default() -> Self {
        Self {
            order_usd_size: 25.0,
            poll_interval_secs: 2,
            fill_timeout_secs: 30,
            hold_secs: 20,
            exit_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExchangeSection {
    pub base_url: Option<String>,
    pub api_key_env: String,
    pub api_secret_env: String,
    pub request_timeout_secs: u64,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: "KRAKEN_API_KEY".into(),
            api_secret_env: "KRAKEN_API_SECRET".into(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OracleSection {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            program: "python3".into(),
            args: vec!["oracle.py".into()],
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReportSection {
    pub path: String,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            path: crate::storage::DEFAULT_REPORT_FILE.into(),
        }
    }
}

/// Exchange credentials. Debug output is redacted by `secrecy`.
#[derive(Debug)]
pub struct Credentials {
    pub api_key: SecretString,
    pub api_secret: SecretString,
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Longest campaign window accepted, in days.
pub const MAX_CAMPAIGN_DAYS: f64 = 3_650.0;

fn parse_number(name: &str, value: &str) -> Result<f64> {
    let parsed: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("{name} is not a number"))?;
    if !parsed.is_finite() {
        bail!("{name} must be finite");
    }
    Ok(parsed)
}

fn parse_positive(name: &str, value: &str) -> Result<f64> {
    let parsed = parse_number(name, value)?;
    if parsed <= 0.0 {
        bail!("{name} must be positive");
    }
    Ok(parsed)
}

/// Zero is meaningful here: it disables the drawdown stop, or accepts any confidence.
fn parse_non_negative(name: &str, value: &str) -> Result<f64> {
    let parsed = parse_number(name, value)?;
    if parsed < 0.0 {
        bail!("{name} must not be negative");
    }
    Ok(parsed)
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load from `path` if it exists, defaults otherwise; then apply the
    /// process environment and validate.
    pub fn load_or_default(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the operator environment overrides through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let sim = lookup("SIM_MODE").is_some_and(|v| is_truthy(&v));
        let live = lookup("LIVE_TRADING").is_some_and(|v| is_truthy(&v));
        match (sim, live) {
            (true, true) => bail!("SIM_MODE and LIVE_TRADING are both set; choose one"),
            (true, false) => self.mode = RunMode::Simulation,
            (false, true) => self.mode = RunMode::Live,
            (false, false) => {}
        }

        if let Some(v) = lookup("ORDER_USD_SIZE") {
            self.live.order_usd_size = parse_positive("ORDER_USD_SIZE", &v)?;
        }
        if let Some(v) = lookup("ORDER_RISK_PCT") {
            self.strike.risk_per_trade_pct = parse_positive("ORDER_RISK_PCT", &v)?;
        }
        if let Some(v) = lookup("CAMPAIGN_DAYS") {
            self.campaign.campaign_days = parse_positive("CAMPAIGN_DAYS", &v)?;
        }
        if let Some(v) = lookup("MAX_DRAWDOWN_PCT") {
            self.campaign.max_drawdown_pct = parse_non_negative("MAX_DRAWDOWN_PCT", &v)?;
        }
        if let Some(v) = lookup("MIN_CONFIDENCE") {
            self.strike.min_confidence = parse_non_negative("MIN_CONFIDENCE", &v)?;
        }
        Ok(())
    }

    /// Range checks across all sections.
    pub fn validate(&self) -> Result<()> {
        let s = &self.strike;
        if s.min_leverage == 0 || s.min_leverage > s.max_leverage {
            bail!("strike.min_leverage/max_leverage [{}, {}] is invalid", s.min_leverage, s.max_leverage);
        }
        if !(s.strike_force_pct > 0.0 && s.strike_force_pct <= 1.0) {
            bail!("strike.strike_force_pct must be in (0, 1]");
        }
        if !(0.0..=1.0).contains(&s.min_confidence) {
            bail!("strike.min_confidence / MIN_CONFIDENCE must be in [0, 1]");
        }
        if !(s.risk_per_trade_pct > 0.0 && s.risk_per_trade_pct <= 100.0) {
            bail!("strike.risk_per_trade_pct / ORDER_RISK_PCT must be in (0, 100]");
        }

        let c = &self.campaign;
        if c.initial_capital <= 0.0 {
            bail!("campaign.initial_capital must be positive");
        }
        if !(0.0..100.0).contains(&c.max_drawdown_pct) {
            bail!("campaign.max_drawdown_pct / MAX_DRAWDOWN_PCT must be in [0, 100)");
        }
        if !(c.campaign_days > 0.0 && c.campaign_days <= MAX_CAMPAIGN_DAYS) {
            bail!("campaign.campaign_days / CAMPAIGN_DAYS must be in (0, {MAX_CAMPAIGN_DAYS}]");
        }
        if c.max_consecutive_misses == 0 {
            bail!("campaign.max_consecutive_misses must be at least 1");
        }
        if c.max_consecutive_aborts == 0 {
            bail!("campaign.max_consecutive_aborts must be at least 1");
        }

        let sim = &self.simulation;
        for (name, v) in [
            ("simulation.round_trip_fee_pct", sim.round_trip_fee_pct),
            ("simulation.take_profit_pct", sim.take_profit_pct),
            ("simulation.stop_loss_pct", sim.stop_loss_pct),
            ("simulation.price_noise_pct", sim.price_noise_pct),
        ] {
            if !(0.0..1.0).contains(&v) {
                bail!("{name} must be in [0, 1)");
            }
        }

        if self.live.order_usd_size <= 0.0 {
            bail!("live.order_usd_size / ORDER_USD_SIZE must be positive");
        }
        if self.live.poll_interval_secs == 0 {
            bail!("live.poll_interval_secs must be at least 1");
        }
        if self.oracle.timeout_secs == 0 {
            bail!("oracle.timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Resolve exchange credentials from the configured env-var names.
    pub fn credentials<F>(&self, lookup: F) -> Result<Credentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |name: &str| -> Result<SecretString> {
            match lookup(name) {
                Some(v) if !v.trim().is_empty() => Ok(SecretString::new(v.trim().to_string())),
                _ => bail!("Environment variable not set: {name}"),
            }
        };
        Ok(Credentials {
            api_key: resolve(&self.exchange.api_key_env)?,
            api_secret: resolve(&self.exchange.api_secret_env)?,
        })
    }

    pub fn initial_capital_cents(&self) -> i64 {
        crate::engine::accountant::f64_usd_to_cents(self.campaign.initial_capital)
    }

    pub fn sizing_config(&self) -> SizingConfig {
        // The per-trade risk cap only applies to simulated outcomes at a fixed stop.
        let risk_budget = (self.mode == RunMode::Simulation).then(|| RiskBudget {
            risk_per_trade_pct: self.strike.risk_per_trade_pct / 100.0,
            stop_loss_pct: self.simulation.stop_loss_pct,
        });
        SizingConfig {
            strike_force_pct: self.strike.strike_force_pct,
            min_leverage: self.strike.min_leverage,
            max_leverage: self.strike.max_leverage,
            risk_budget,
        }
    }

    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            max_drawdown_pct: (self.campaign.max_drawdown_pct > 0.0).then_some(self.campaign.max_drawdown_pct),
            max_consecutive_misses: self.campaign.max_consecutive_misses,
            max_consecutive_aborts: self.campaign.max_consecutive_aborts,
        }
    }

    pub fn campaign_config(&self) -> CampaignConfig {
        CampaignConfig {
            total_trades: self.campaign.total_trades,
            target_capital_cents: crate::engine::accountant::f64_usd_to_cents(self.campaign.target_capital),
            window: Duration::try_from_secs_f64(self.campaign.campaign_days * 24.0 * 3600.0).unwrap_or(Duration::MAX),
            production_stops: self.mode.production_stops(),
            cooldown: Duration::from_millis(self.campaign.cooldown_ms),
            progress_every: self.campaign.progress_every,
        }
    }

    pub fn simulation_params(&self) -> SimulationParams {
        let take_profit = match self.mode {
            RunMode::Paper => TakeProfit::ExpectedReturn,
            _ => TakeProfit::Fixed(self.simulation.take_profit_pct),
        };
        SimulationParams {
            round_trip_fee_pct: self.simulation.round_trip_fee_pct,
            take_profit,
            stop_loss_pct: self.simulation.stop_loss_pct,
            price_noise_pct: self.simulation.price_noise_pct,
        }
    }

    pub fn live_timing(&self) -> LiveTiming {
        LiveTiming {
            poll_interval: Duration::from_secs(self.live.poll_interval_secs),
            fill_timeout: Duration::from_secs(self.live.fill_timeout_secs),
            hold: Duration::from_secs(self.live.hold_secs),
            exit_timeout: Duration::from_secs(self.live.exit_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.mode, RunMode::Simulation);
        assert_eq!(cfg.initial_capital_cents(), 10_000_000);
        assert_eq!(cfg.strike.min_confidence, 0.80);
        assert_eq!(cfg.exchange.api_key_env, "KRAKEN_API_KEY");
        assert!(cfg.validate().is_ok());
        assert!(!cfg.campaign_config().production_stops);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            mode = "paper"

            [strike]
            min_confidence = 0.85

            [live]
            hold_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.mode, RunMode::Paper);
        assert_eq!(cfg.strike.min_confidence, 0.85);
        assert_eq!(cfg.strike.max_leverage, 5);
        assert_eq!(cfg.live.hold_secs, 5);
        assert_eq!(cfg.live.fill_timeout_secs, 30);
        assert_eq!(cfg.simulation_params().take_profit, TakeProfit::ExpectedReturn);
        assert!(cfg.sizing_config().risk_budget.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(env(&[
            ("LIVE_TRADING", "true"),
            ("ORDER_USD_SIZE", "50"),
            ("ORDER_RISK_PCT", "2"),
            ("CAMPAIGN_DAYS", "3"),
            ("MAX_DRAWDOWN_PCT", "8"),
            ("MIN_CONFIDENCE", "0.9"),
        ]))
        .unwrap();

        assert_eq!(cfg.mode, RunMode::Live);
        assert_eq!(cfg.live.order_usd_size, 50.0);
        assert_eq!(cfg.strike.risk_per_trade_pct, 2.0);
        assert_eq!(cfg.campaign.campaign_days, 3.0);
        assert_eq!(cfg.risk_config().max_drawdown_pct, Some(8.0));
        assert_eq!(cfg.strike.min_confidence, 0.9);
        assert_eq!(cfg.campaign_config().window, Duration::from_secs(3 * 24 * 3600));
        tokio_test::assert_ok!(cfg.validate());
    }

    #[test]
    fn test_conflicting_modes_rejected() {
        let mut cfg = AppConfig::default();
        let err = cfg
            .apply_overrides(env(&[("SIM_MODE", "1"), ("LIVE_TRADING", "1")]))
            .unwrap_err();
        assert!(err.to_string().contains("SIM_MODE"));
    }

    #[test]
    fn test_malformed_override_names_variable() {
        let mut cfg = AppConfig::default();
        let err = cfg.apply_overrides(env(&[("ORDER_USD_SIZE", "lots")])).unwrap_err();
        assert!(err.to_string().contains("ORDER_USD_SIZE"));

        let err = cfg.apply_overrides(env(&[("CAMPAIGN_DAYS", "-1")])).unwrap_err();
        assert!(err.to_string().contains("CAMPAIGN_DAYS"));
    }

    #[test]
    fn test_zero_disables_drawdown_and_confidence_floor() {
        let mut cfg = AppConfig::default();
        tokio_test::assert_ok!(cfg.apply_overrides(env(&[("MAX_DRAWDOWN_PCT", "0"), ("MIN_CONFIDENCE", "0")])));
        assert_eq!(cfg.risk_config().max_drawdown_pct, None);
        assert_eq!(cfg.strike.min_confidence, 0.0);
        tokio_test::assert_ok!(cfg.validate());

        let err = cfg.apply_overrides(env(&[("MAX_DRAWDOWN_PCT", "-1")])).unwrap_err();
        assert!(err.to_string().contains("MAX_DRAWDOWN_PCT"));
        assert!(cfg.apply_overrides(env(&[("MIN_CONFIDENCE", "NaN")])).is_err());
    }

    #[test]
    fn test_huge_campaign_window_rejected() {
        let mut cfg = AppConfig::default();
        tokio_test::assert_ok!(cfg.apply_overrides(env(&[("CAMPAIGN_DAYS", "1e300")])));
        let err = tokio_test::assert_err!(cfg.validate());
        assert!(err.to_string().contains("campaign_days"));
        // Unvalidated configs still produce a window instead of panicking.
        assert_eq!(cfg.campaign_config().window, Duration::MAX);

        cfg.campaign.campaign_days = MAX_CAMPAIGN_DAYS;
        tokio_test::assert_ok!(cfg.validate());
    }

    #[test]
    fn test_abort_limit_flows_into_risk_config() {
        let cfg = AppConfig::from_toml("[campaign]\nmax_consecutive_aborts = 2\n").unwrap();
        assert_eq!(cfg.risk_config().max_consecutive_aborts, 2);

        let mut cfg = AppConfig::default();
        cfg.campaign.max_consecutive_aborts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut cfg = AppConfig::default();
        cfg.strike.min_confidence = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.strike.min_leverage = 6;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.campaign.max_drawdown_pct = 100.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_simulation_sizing_uses_risk_budget() {
        let cfg = AppConfig::default();
        let budget = cfg.sizing_config().risk_budget.unwrap();
        assert_eq!(budget.risk_per_trade_pct, 0.01);
        assert_eq!(budget.stop_loss_pct, 0.0025);
    }

    #[test]
    fn test_credentials_missing_names_variable_only() {
        let cfg = AppConfig::default();
        let err = cfg.credentials(env(&[("KRAKEN_API_KEY", "key-value")])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("KRAKEN_API_SECRET"));
        assert!(!msg.contains("key-value"));
    }

    #[test]
    fn test_credentials_resolved_and_redacted() {
        let cfg = AppConfig::default();
        let creds = cfg
            .credentials(env(&[("KRAKEN_API_KEY", "my-key"), ("KRAKEN_API_SECRET", "c2VjcmV0")]))
            .unwrap();
        assert_eq!(creds.api_key.expose_secret(), "my-key");
        assert!(!format!("{creds:?}").contains("my-key"));
    }

    #[test]
    fn test_load_sample_config() {
        // Only meaningful when run from the crate root.
        if let Ok(cfg) = AppConfig::load("config.toml") {
            assert!(cfg.validate().is_ok());
            assert_eq!(cfg.strike.min_leverage, 3);
        }
    }
}
