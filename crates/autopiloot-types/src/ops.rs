use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Incremental-discovery high-water mark, keyed by `(service, scope)`,
/// e.g. `("youtube_uploads", channel_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub service: String,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn key(&self) -> String {
        checkpoint_key(&self.service, &self.scope)
    }
}

pub fn checkpoint_key(service: &str, scope: &str) -> String {
    format!("{service}_{scope}")
}

/// The `costs_daily/{yyyy-mm-dd}` ledger row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyCosts {
    pub date: NaiveDate,
    pub total_usd: f64,
    pub transcription_usd: f64,
    pub llm_usd: f64,
    pub other_usd: f64,
}

impl DailyCosts {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_usd: 0.0,
            transcription_usd: 0.0,
            llm_usd: 0.0,
            other_usd: 0.0,
        }
    }
}

/// Append-only audit record. Written only through the orchestrator's audit
/// logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub actor: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: Value,
}

/// Aggregate outcome of one run, as reported by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub planned: u64,
    pub succeeded: u64,
    pub failed: u64,
    #[serde(default)]
    pub dlq_count: u64,
    /// Per-service quota utilization in `[0, 1]`.
    #[serde(default)]
    pub quota_state: BTreeMap<String, f64>,
    #[serde(default)]
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: String,
    pub run_type: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub trigger: String,
}

impl RunContext {
    pub fn duration_hours(&self) -> f64 {
        match self.completed_at {
            Some(completed_at) => {
                (completed_at - self.started_at).num_seconds().max(0) as f64 / 3600.0
            }
            None => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn checkpoint_key_joins_service_and_scope() {
        assert_eq!(
            checkpoint_key("youtube_uploads", "UCfV36TX5AejfAGIbtwTc7Zw"),
            "youtube_uploads_UCfV36TX5AejfAGIbtwTc7Zw"
        );
    }

    #[test]
    fn run_duration_is_zero_until_completed() {
        let started = Utc.with_ymd_and_hms(2025, 1, 27, 1, 0, 0).unwrap();
        let mut ctx = RunContext {
            run_id: "daily_20250127".to_string(),
            run_type: "scheduled_daily".to_string(),
            started_at: started,
            completed_at: None,
            trigger: "scheduler".to_string(),
        };
        assert_eq!(ctx.duration_hours(), 0.0);

        ctx.completed_at = Some(Utc.with_ymd_and_hms(2025, 1, 27, 3, 45, 0).unwrap());
        assert!((ctx.duration_hours() - 2.75).abs() < 1e-9);
    }
}
