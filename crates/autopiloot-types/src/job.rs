use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dlq::ErrorType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    Scraper,
    Transcriber,
    Summarizer,
}

impl Agent {
    pub fn as_str(self) -> &'static str {
        match self {
            Agent::Scraper => "scraper",
            Agent::Transcriber => "transcriber",
            Agent::Summarizer => "summarizer",
        }
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ChannelScrape,
    SheetBackfill,
    SingleVideo,
    BatchTranscribe,
    SingleSummary,
    BatchSummarize,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::ChannelScrape,
        JobType::SheetBackfill,
        JobType::SingleVideo,
        JobType::BatchTranscribe,
        JobType::SingleSummary,
        JobType::BatchSummarize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::ChannelScrape => "channel_scrape",
            JobType::SheetBackfill => "sheet_backfill",
            JobType::SingleVideo => "single_video",
            JobType::BatchTranscribe => "batch_transcribe",
            JobType::SingleSummary => "single_summary",
            JobType::BatchSummarize => "batch_summarize",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|jt| jt.as_str() == raw)
    }

    pub fn agent(self) -> Agent {
        match self {
            JobType::ChannelScrape | JobType::SheetBackfill => Agent::Scraper,
            JobType::SingleVideo | JobType::BatchTranscribe => Agent::Transcriber,
            JobType::SingleSummary | JobType::BatchSummarize => Agent::Summarizer,
        }
    }

    /// Discovery jobs draw on the YouTube API quota.
    pub fn is_discovery(self) -> bool {
        matches!(self, JobType::ChannelScrape | JobType::SheetBackfill)
    }

    /// Transcription jobs draw on the AssemblyAI quota and the daily budget.
    pub fn is_transcription(self) -> bool {
        matches!(self, JobType::SingleVideo | JobType::BatchTranscribe)
    }

    pub fn is_summarization(self) -> bool {
        matches!(self, JobType::SingleSummary | JobType::BatchSummarize)
    }

    /// Real-time jobs get elevated recovery priority when they fail.
    pub fn is_realtime(self) -> bool {
        matches!(
            self,
            JobType::ChannelScrape | JobType::SingleVideo | JobType::SingleSummary
        )
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    Medium,
    High,
}

impl JobPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            JobPriority::Low => "low",
            JobPriority::Medium => "medium",
            JobPriority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Delivery targets for a finished summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Drive,
    Zep,
    Slack,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Drive => "drive",
            Platform::Zep => "zep",
            Platform::Slack => "slack",
        }
    }
}

/// Typed per-job-type inputs. The variant carries exactly the fields the
/// job type requires, so a record with missing inputs cannot be constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job_type", content = "inputs", rename_all = "snake_case")]
pub enum JobInputs {
    ChannelScrape {
        channels: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit_per_channel: Option<u32>,
    },
    SheetBackfill {
        sheet_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<String>,
    },
    SingleVideo {
        video_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        priority: Option<JobPriority>,
    },
    BatchTranscribe {
        video_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_size: Option<u32>,
    },
    SingleSummary {
        video_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        platforms: Option<Vec<Platform>>,
    },
    BatchSummarize {
        video_ids: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt_override: Option<String>,
    },
}

impl JobInputs {
    pub fn job_type(&self) -> JobType {
        match self {
            JobInputs::ChannelScrape { .. } => JobType::ChannelScrape,
            JobInputs::SheetBackfill { .. } => JobType::SheetBackfill,
            JobInputs::SingleVideo { .. } => JobType::SingleVideo,
            JobInputs::BatchTranscribe { .. } => JobType::BatchTranscribe,
            JobInputs::SingleSummary { .. } => JobType::SingleSummary,
            JobInputs::BatchSummarize { .. } => JobType::BatchSummarize,
        }
    }

    /// Every video ID this job touches, in input order.
    pub fn video_ids(&self) -> Vec<&str> {
        match self {
            JobInputs::SingleVideo { video_id, .. } | JobInputs::SingleSummary { video_id, .. } => {
                vec![video_id.as_str()]
            }
            JobInputs::BatchTranscribe { video_ids, .. }
            | JobInputs::BatchSummarize { video_ids, .. } => {
                video_ids.iter().map(String::as_str).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Per-call policy knobs; unset fields fall back to configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_limit_usd: Option<f64>,
}

impl PolicyOverrides {
    pub fn is_empty(&self) -> bool {
        *self == PolicyOverrides::default()
    }
}

/// An active work order at `jobs/{agent}/active/{job_id}`. Deleted on
/// success or when routed to the dead-letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    #[serde(flatten)]
    pub inputs: JobInputs,
    #[serde(default, skip_serializing_if = "PolicyOverrides::is_empty")]
    pub policy_overrides: PolicyOverrides,
    pub status: JobStatus,
    pub retry_count: u32,
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_type: Option<ErrorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_quota_units: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_output_tokens: Option<u64>,
}

impl JobRecord {
    pub fn job_type(&self) -> JobType {
        self.inputs.job_type()
    }

    pub fn agent(&self) -> Agent {
        self.job_type().agent()
    }
}
