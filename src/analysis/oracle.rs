//! Subprocess analysis oracle.
//!
//! Invokes an external program as `<program> <args...> <symbol> <strategy-label>`
//! and parses a single JSON object from its stdout. The call is bounded by
//! a timeout; the child is killed if it overruns.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::Evaluator;
use crate::types::{AnalysisResult, StrikeCategory, TradeError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OracleProcess {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl OracleProcess {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
        }
    }

    async fn run(&self, symbol: &str, label: &str) -> Result<Vec<u8>, String> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(symbol)
            .arg(label)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {e}", self.program))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("oracle timed out after {:?}", self.timeout))?
            .map_err(|e| format!("oracle I/O error: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "oracle exited with {}: {}",
                output.status,
                stderr.trim().chars().take(200).collect::<String>()
            ));
        }
        Ok(output.stdout)
    }
}

/// Parse the oracle's stdout. Tolerates log lines before the JSON object by
/// taking the last line that starts with `{`.
pub fn parse_oracle_output(stdout: &[u8]) -> Result<AnalysisResult, TradeError> {
    let text = String::from_utf8_lossy(stdout);
    let json = text
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('{'))
        .unwrap_or_else(|| text.trim());

    let analysis: AnalysisResult = serde_json::from_str(json)
        .map_err(|e| TradeError::AnalysisUnavailable(format!("unparseable oracle output: {e}")))?;

    if !analysis.price.is_finite() || analysis.price <= 0.0 {
        return Err(TradeError::AnalysisUnavailable(format!(
            "oracle returned invalid price {}",
            analysis.price
        )));
    }
    for (field, value) in [
        ("confidence", analysis.confidence),
        ("precision_score", analysis.precision_score),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(TradeError::AnalysisUnavailable(format!(
                "oracle returned {field} {value} outside [0, 1]"
            )));
        }
    }
    Ok(analysis)
}

#[async_trait]
impl Evaluator for OracleProcess {
    async fn evaluate(&self, symbol: &str, category: StrikeCategory) -> Result<AnalysisResult, TradeError> {
        let label = category.strategy_label();
        let stdout = self.run(symbol, label).await.map_err(|e| {
            debug!(symbol, label, error = %e, "Analysis oracle failed");
            TradeError::AnalysisUnavailable(e)
        })?;

        let analysis = parse_oracle_output(&stdout)?;
        debug!(%analysis, "Oracle evaluation");
        Ok(analysis)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
