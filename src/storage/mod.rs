//! Persistence layer.
//!
//! Writes the final campaign report to a JSON file and reads it back.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::campaign::CampaignReport;

/// Default report file path.
pub const DEFAULT_REPORT_FILE: &str = "campaign_report.json";

/// Save a campaign report as pretty JSON.
pub fn save_report(report: &CampaignReport, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_REPORT_FILE);
    let json = serde_json::to_string_pretty(report).context("Failed to serialise campaign report")?;

    std::fs::write(path, &json).context(format!("Failed to write report to {path}"))?;

    info!(path, stop_reason = %report.stop_reason, "Campaign report saved");
    Ok(())
}

/// Load a campaign report. Returns None if the file doesn't exist.
pub fn load_report(path: Option<&str>) -> Result<Option<CampaignReport>> {
    let path = path.unwrap_or(DEFAULT_REPORT_FILE);

    if !Path::new(path).exists() {
        debug!(path, "No campaign report found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).context(format!("Failed to read report from {path}"))?;
    let report: CampaignReport =
        serde_json::from_str(&json).context(format!("Failed to parse report from {path}"))?;

    Ok(Some(report))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
