//! Pure classification of raw probe outcomes.
//!
//! Maps a [`ProbeOutcome`] plus the monitor's expectations (accepted status
//! code ranges, degraded latency threshold) to a semantic status. No I/O.

use super::types::{MonitorStatus, ProbeOutcome};

/// Fallback range applied when a monitor has no expected codes configured
pub const DEFAULT_STATUS_CODES: &str = "200-299";

/// Parse a single range string: either an exact code (`"301"`) or an
/// inclusive span (`"200-299"`). Returns `None` for anything malformed.
pub fn parse_code_range(range: &str) -> Option<(u16, u16)> {
    let range = range.trim();

    match range.split_once('-') {
        Some((start, end)) => {
            let start: u16 = start.trim().parse().ok()?;
            let end: u16 = end.trim().parse().ok()?;
            if start > end {
                return None;
            }
            Some((start, end))
        }
        None => {
            let code: u16 = range.parse().ok()?;
            Some((code, code))
        }
    }
}

/// Whether `code` falls inside any of the configured ranges.
///
/// Malformed range entries never match, so a fully malformed configuration
/// fails closed toward `down`.
pub fn code_matches(code: u16, ranges: &[String]) -> bool {
    ranges.iter().any(|range| match parse_code_range(range) {
        Some((start, end)) => code >= start && code <= end,
        None => {
            tracing::warn!("ignoring malformed status code range: {:?}", range);
            false
        }
    })
}

/// Normalize a comma-separated status code specification into the stored
/// list form. Empty input falls back to [`DEFAULT_STATUS_CODES`] so the list
/// is always non-empty. Applied identically at create and update time.
pub fn normalize_status_codes(raw: &str) -> Vec<String> {
    let codes: Vec<String> = raw
        .split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect();

    if codes.is_empty() {
        vec![DEFAULT_STATUS_CODES.to_string()]
    } else {
        codes
    }
}

/// Classify a raw probe outcome.
///
/// `down` when the probe failed outright or an HTTP status code falls outside
/// every expected range; `degraded` when successful but slower than the
/// threshold; `up` otherwise.
pub fn classify(
    outcome: &ProbeOutcome,
    expected_status_codes: &[String],
    degraded_threshold_ms: u64,
) -> MonitorStatus {
    if outcome.is_failure() {
        return MonitorStatus::Down;
    }

    if let Some(code) = outcome.status_code {
        if !code_matches(code, expected_status_codes) {
            return MonitorStatus::Down;
        }
    }

    match outcome.latency_ms {
        Some(latency) if latency > degraded_threshold_ms => MonitorStatus::Degraded,
        Some(_) => MonitorStatus::Up,
        // Latency missing without an error should not happen; treat as down
        // rather than inventing an up.
        None => MonitorStatus::Down,
    }
}
