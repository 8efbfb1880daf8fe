//! # Duration Parsing
//!
//! Handles parsing Kubernetes duration strings.

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

// Matches: <number><unit> where unit is s, m, h or d
static DURATION_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$").ok());

/// Parse Kubernetes duration string into std::time::Duration
/// Supports formats: "30s", "1m", "5m", "1h", "2h", "1d"
/// Returns Duration or error if format is invalid
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let duration_regex = DURATION_REGEX
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Failed to compile duration regex"))?;

    let interval_lower = duration_trimmed.to_lowercase();

    let captures = duration_regex.captures(&interval_lower).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid duration format '{duration_trimmed}'. Expected format: <number><unit> (e.g., '10s', '1m', '1h')"
        )
    })?;

    let number_str = captures
        .name("number")
        .ok_or_else(|| anyhow::anyhow!("Failed to extract number from duration '{duration_trimmed}'"))?
        .as_str();
    let unit = captures
        .name("unit")
        .ok_or_else(|| anyhow::anyhow!("Failed to extract unit from duration '{duration_trimmed}'"))?
        .as_str();

    let number: u64 = number_str.parse().map_err(|e| {
        anyhow::anyhow!("Invalid duration number '{number_str}' in '{duration_trimmed}': {e}")
    })?;

    if number == 0 {
        return Err(anyhow::anyhow!(
            "Duration number must be greater than 0, got '{duration_trimmed}'"
        ));
    }

    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => {
            return Err(anyhow::anyhow!(
                "Invalid unit '{unit}' in duration '{duration_trimmed}'. Expected: s, m, h, or d"
            ));
        }
    };

    let seconds = number
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("Duration '{duration_trimmed}' is too large"))?;

    Ok(Duration::from_secs(seconds))
}
