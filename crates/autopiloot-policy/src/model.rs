use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use autopiloot_types::{Checkpoint, DailyCosts, ErrorType, JobType};

/// The unit a discovery job is about to process, for checkpoint evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetItem {
    pub video_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

/// Everything the engine knows about the job being evaluated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    pub job_id: String,
    pub job_type: JobType,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetItem>,
    /// Total estimated cost when the caller has per-video data; otherwise
    /// the engine assumes the default per-video estimate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,
    /// Number of videos the job covers; drives the default cost estimate.
    #[serde(default = "one")]
    pub video_count: u32,
}

fn one() -> u32 {
    1
}

impl JobContext {
    /// Fresh dispatch-time context: no retries, no prior error.
    pub fn for_dispatch(job_id: impl Into<String>, job_type: JobType, video_count: u32) -> Self {
        Self {
            job_id: job_id.into(),
            job_type,
            retry_count: 0,
            last_attempt_at: None,
            error_type: None,
            target: None,
            estimated_cost_usd: None,
            video_count,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub youtube_units_used: u64,
    pub assemblyai_jobs_used: u64,
}

/// Snapshot of the system state relevant to policy checks. Reads are
/// as-of the last store commit, not transactional with the decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    #[serde(default)]
    pub quota_usage: QuotaUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_costs: Option<DailyCosts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
}

/// Configured ceilings the engine enforces. Built by the caller from
/// application configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PolicyLimits {
    pub max_attempts: u32,
    pub base_delay_sec: u64,
    pub youtube_daily_limit: u64,
    pub assemblyai_daily_limit: u64,
    pub transcription_daily_budget_usd: f64,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_sec: 60,
            youtube_daily_limit: 10_000,
            assemblyai_daily_limit: 100,
            transcription_daily_budget_usd: 5.0,
        }
    }
}

/// The four policy outcomes. Exactly one is returned per evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    Proceed,
    RetryIn { delay_sec: u64, reason: String },
    Skip { reason: String },
    Dlq { reason: String },
}

impl Decision {
    pub fn action(&self) -> &'static str {
        match self {
            Decision::Proceed => "proceed",
            Decision::RetryIn { .. } => "retry_in",
            Decision::Skip { .. } => "skip",
            Decision::Dlq { .. } => "dlq",
        }
    }
}
