use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::{JobInputs, JobType, Platform};

/// Classified failure cause. Unrecognized values deserialize to `Other` so
/// entries written by newer builds still load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    InvalidVideoId,
    VideoTooLong,
    UnsupportedFormat,
    AuthorizationFailed,
    DataCorruption,
    SecurityViolation,
    SystemCritical,
    QuotaExceeded,
    BudgetExceeded,
    InvalidConfiguration,
    DependencyFailure,
    ApiTimeout,
    RateLimit,
    ConnectionError,
    ValidationError,
    ServerError,
    Other,
}

impl<'de> Deserialize<'de> for ErrorType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(ErrorType::parse(&raw).unwrap_or(ErrorType::Other))
    }
}

impl ErrorType {
    pub const ALL: [ErrorType; 17] = [
        ErrorType::InvalidVideoId,
        ErrorType::VideoTooLong,
        ErrorType::UnsupportedFormat,
        ErrorType::AuthorizationFailed,
        ErrorType::DataCorruption,
        ErrorType::SecurityViolation,
        ErrorType::SystemCritical,
        ErrorType::QuotaExceeded,
        ErrorType::BudgetExceeded,
        ErrorType::InvalidConfiguration,
        ErrorType::DependencyFailure,
        ErrorType::ApiTimeout,
        ErrorType::RateLimit,
        ErrorType::ConnectionError,
        ErrorType::ValidationError,
        ErrorType::ServerError,
        ErrorType::Other,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == raw)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::InvalidVideoId => "invalid_video_id",
            ErrorType::VideoTooLong => "video_too_long",
            ErrorType::UnsupportedFormat => "unsupported_format",
            ErrorType::AuthorizationFailed => "authorization_failed",
            ErrorType::DataCorruption => "data_corruption",
            ErrorType::SecurityViolation => "security_violation",
            ErrorType::SystemCritical => "system_critical",
            ErrorType::QuotaExceeded => "quota_exceeded",
            ErrorType::BudgetExceeded => "budget_exceeded",
            ErrorType::InvalidConfiguration => "invalid_configuration",
            ErrorType::DependencyFailure => "dependency_failure",
            ErrorType::ApiTimeout => "api_timeout",
            ErrorType::RateLimit => "rate_limit",
            ErrorType::ConnectionError => "connection_error",
            ErrorType::ValidationError => "validation_error",
            ErrorType::ServerError => "server_error",
            ErrorType::Other => "other",
        }
    }

    /// Terminal errors are never retried; the policy engine routes them
    /// straight to the dead-letter queue.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ErrorType::InvalidVideoId
                | ErrorType::VideoTooLong
                | ErrorType::UnsupportedFormat
                | ErrorType::AuthorizationFailed
        )
    }

    fn base_severity(self) -> Severity {
        match self {
            ErrorType::AuthorizationFailed
            | ErrorType::DataCorruption
            | ErrorType::SecurityViolation
            | ErrorType::SystemCritical => Severity::High,
            ErrorType::QuotaExceeded
            | ErrorType::BudgetExceeded
            | ErrorType::InvalidConfiguration
            | ErrorType::DependencyFailure => Severity::Medium,
            _ => Severity::Low,
        }
    }

    /// Severity with the persistent-failure escalation: many retries on an
    /// otherwise low-grade error indicate a stuck dependency.
    pub fn severity(self, retry_count: u32) -> Severity {
        let base = self.base_severity();
        if base == Severity::Low && retry_count >= 5 {
            Severity::Medium
        } else {
            base
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl RecoveryPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryPriority::Low => "low",
            RecoveryPriority::Medium => "medium",
            RecoveryPriority::High => "high",
            RecoveryPriority::Urgent => "urgent",
        }
    }

    /// Manual-intervention urgency from severity and job shape. High
    /// severity is always urgent; real-time jobs outrank batch work.
    pub fn derive(severity: Severity, job_type: JobType) -> Self {
        match severity {
            Severity::High => RecoveryPriority::Urgent,
            Severity::Medium if job_type.is_realtime() => RecoveryPriority::High,
            _ if job_type.is_realtime() => RecoveryPriority::Medium,
            _ => RecoveryPriority::Low,
        }
    }
}

/// Everything known about the failure at routing time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContext {
    pub error_type: ErrorType,
    pub error_message: String,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_inputs: Option<JobInputs>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryHints {
    #[serde(default)]
    pub manual_action_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
}

/// A `jobs_deadletter/{dlq_id}` entry. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub dlq_id: String,
    pub original_job_id: String,
    pub job_type: JobType,
    pub failure_context: FailureContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_hints: Option<RecoveryHints>,
    pub dlq_created_at: DateTime<Utc>,
    pub dlq_created_by: String,
    pub severity: Severity,
    pub recovery_priority: RecoveryPriority,
    pub processing_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub video_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_channels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_quota_impact: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_impact: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_platforms: Vec<Platform>,
}

impl DlqEntry {
    /// Whether this entry concerns `video_id`, searching the denormalized
    /// fields and the preserved original inputs.
    pub fn mentions_video(&self, video_id: &str) -> bool {
        if self.video_id.as_deref() == Some(video_id) {
            return true;
        }
        if self.video_ids.iter().any(|id| id == video_id) {
            return true;
        }
        match &self.failure_context.original_inputs {
            Some(inputs) => inputs.video_ids().contains(&video_id),
            None => false,
        }
    }
}
