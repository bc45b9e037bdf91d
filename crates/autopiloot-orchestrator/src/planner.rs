//! Daily run planning: a pure projection of configuration and current
//! state into the day's actionable plan. No side effects.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use autopiloot_providers::youtube::UNITS_PER_CHANNEL_SCAN;
use autopiloot_store::DlqQuery;
use autopiloot_types::{Checkpoint, ErrorType};

use crate::dispatch::Orchestrator;
use crate::error::OrchestratorError;

#[derive(Debug, Clone, Default)]
pub struct PlanOverrides {
    pub target_channels: Option<Vec<String>>,
    pub max_videos_per_channel: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub youtube_daily_quota: u64,
    pub assemblyai_daily_limit: u64,
    pub transcription_budget_usd: f64,
    pub estimated_quota_usage: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_sec: u64,
    pub backoff_strategy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPlan {
    pub plan_generated_at: DateTime<Utc>,
    pub channels: Vec<String>,
    pub per_channel_limit: u32,
    pub total_videos_planned: u64,
    /// Operational windows, discovery before transcription before
    /// summarization within a run.
    pub windows: Vec<String>,
    pub checkpoints: Vec<Checkpoint>,
    pub resource_limits: ResourceLimits,
    pub retry_policy: RetryPolicy,
    pub warnings: Vec<String>,
    /// Yesterday's `budget_exceeded` DLQ entries, re-enqueued today once
    /// the ledger has reset.
    pub reenqueue_candidates: Vec<String>,
    pub operational_status: String,
}

impl Orchestrator {
    pub async fn plan_daily_run(
        &self,
        overrides: PlanOverrides,
    ) -> Result<DailyPlan, OrchestratorError> {
        let config = &self.handles.config;
        let now = Utc::now();

        let channels = overrides
            .target_channels
            .filter(|channels| !channels.is_empty())
            .unwrap_or_else(|| config.scraper.handles.clone());
        let per_channel_limit = overrides
            .max_videos_per_channel
            .unwrap_or(config.scraper.daily_limit_per_channel);

        let total_videos_planned = channels.len() as u64 * per_channel_limit as u64;
        let estimated_quota_usage = channels.len() as u64 * UNITS_PER_CHANNEL_SCAN;

        let youtube_quota = config.reliability.quotas.youtube_daily_limit;
        let assemblyai_limit = config.reliability.quotas.assemblyai_daily_limit;

        let mut warnings = Vec::new();
        if estimated_quota_usage as f64 > youtube_quota as f64 * 0.8 {
            warnings.push(format!(
                "Estimated quota usage ({estimated_quota_usage}) approaching YouTube daily limit ({youtube_quota})"
            ));
        }
        if total_videos_planned > assemblyai_limit {
            warnings.push(format!(
                "Planned videos ({total_videos_planned}) exceed AssemblyAI daily limit ({assemblyai_limit})"
            ));
        }

        let checkpoints = self.handles.store.list_checkpoints().await?;

        // Budget-exceeded jobs are terminal for the day they failed; the
        // next plan offers them again once the ledger has reset.
        let yesterday_start = now - Duration::hours(24);
        let reenqueue_candidates = self
            .handles
            .store
            .query_dlq(&DlqQuery {
                since: Some(yesterday_start),
                until: None,
                job_type: None,
                severity: None,
                video_id: None,
                limit: Some(500),
            })
            .await?
            .into_iter()
            .filter(|entry| entry.failure_context.error_type == ErrorType::BudgetExceeded)
            .map(|entry| entry.original_job_id)
            .collect();

        Ok(DailyPlan {
            plan_generated_at: now,
            channels,
            per_channel_limit,
            total_videos_planned,
            windows: vec![
                "scraping_window: 01:00-02:00 Europe/Amsterdam".to_string(),
                "transcription_window: 02:00-06:00 Europe/Amsterdam".to_string(),
                "summarization_window: 06:00-08:00 Europe/Amsterdam".to_string(),
            ],
            checkpoints,
            resource_limits: ResourceLimits {
                youtube_daily_quota: youtube_quota,
                assemblyai_daily_limit: assemblyai_limit,
                transcription_budget_usd: config.budgets.transcription_daily_usd,
                estimated_quota_usage,
            },
            retry_policy: RetryPolicy {
                max_attempts: config.reliability.retry.max_attempts,
                base_delay_sec: config.reliability.retry.base_delay_sec,
                backoff_strategy: "exponential".to_string(),
            },
            warnings,
            reenqueue_candidates,
            operational_status: "planned".to_string(),
        })
    }
}
