// UTC time handling
// Every timestamp in the system is UTC and rendered as ISO 8601 with a
// trailing `Z`; everything here is pure apart from `now()`.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use thiserror::Error;

/// Backoff delays never exceed 24 hours.
pub const MAX_BACKOFF_SEC: u64 = 86_400;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("unable to parse ISO 8601 timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("unable to parse ISO 8601 duration: {0}")]
    InvalidDuration(String),
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Render as `2025-09-15T14:30:00Z` (second precision).
pub fn to_iso8601_z(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Parse any RFC 3339 shape (`Z`, fractional seconds, explicit offsets)
/// and normalize to UTC.
pub fn parse_iso8601_z(raw: &str) -> Result<DateTime<Utc>, TimeError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TimeError::InvalidTimestamp(raw.to_string()))
}

/// Filename-safe instant, e.g. `20250915_143000`.
pub fn format_for_filename(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%d_%H%M%S").to_string()
}

/// `YYYY-MM-DD` for artifact names; falls back to today when the source
/// timestamp is unknown.
pub fn date_for_filename(published_at: Option<DateTime<Utc>>) -> NaiveDate {
    published_at.unwrap_or_else(Utc::now).date_naive()
}

/// Seconds from `reference` until the next 00:00:00 UTC. Daily quotas and
/// budgets reset on this boundary.
pub fn seconds_until_utc_midnight(reference: DateTime<Utc>) -> u64 {
    86_400 - u64::from(reference.num_seconds_from_midnight())
}

/// Exponential backoff: `base * 2^retry_count`, capped at 24 hours.
pub fn backoff_delay(retry_count: u32, base_delay_sec: u64) -> u64 {
    let factor = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
    base_delay_sec.saturating_mul(factor).min(MAX_BACKOFF_SEC)
}

/// Backoff with a symmetric ±10% jitter to spread synchronized retries.
/// The result stays within the jitter window, at least 1 second, and never
/// above the 24-hour cap.
pub fn jittered_backoff_delay(retry_count: u32, base_delay_sec: u64) -> u64 {
    let base = backoff_delay(retry_count, base_delay_sec);
    let jitter_span = base as f64 * 0.1;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    ((base as f64 + jitter).round() as i64).max(1).min(MAX_BACKOFF_SEC as i64) as u64
}

static ISO_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^PT(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").expect("duration pattern compiles")
});

/// Parse the `PT#H#M#S` duration form used by the channel source into
/// seconds. `PT1H30M45S` -> 5445.
pub fn parse_iso8601_duration(raw: &str) -> Result<u64, TimeError> {
    let captures = ISO_DURATION
        .captures(raw)
        .ok_or_else(|| TimeError::InvalidDuration(raw.to_string()))?;

    let component = |index: usize| -> u64 {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    Ok(component(1) * 3600 + component(2) * 60 + component(3))
}

/// Human-readable duration for reports: `3661` -> `1h 1m 1s`.
pub fn format_duration_human(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}
