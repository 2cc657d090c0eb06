//! Command implementations

pub mod active;
pub mod history;
pub mod index;
pub mod messages;
pub mod projects;
pub mod sessions;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::path::PathBuf;

use crate::config::Config;

/// `MM-DD HH:MM` in UTC, or `-`
pub fn format_millis(ms: Option<i64>) -> String {
    ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|t| t.format("%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Cut to `max` characters, first line only
pub fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

/// Accepts RFC 3339 or a plain `YYYY-MM-DD` (midnight UTC).
pub fn parse_since(value: &str) -> Result<i64> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.timestamp_millis());
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| anyhow!("Invalid date '{}', expected YYYY-MM-DD or RFC 3339", value))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid date '{}'", value))?;
    Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
}

/// Projects root holding `project`, searched across enabled sources
pub fn projects_root_for(config: &Config, project: &str) -> Result<PathBuf> {
    config
        .sources()
        .into_iter()
        .map(|s| s.base_path)
        .find(|root| root.join(project).is_dir())
        .ok_or_else(|| anyhow!("Project not found in any source: {}", project))
}
