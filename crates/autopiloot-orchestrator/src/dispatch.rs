//! Job dispatchers for the scraper, transcriber, and summarizer agents.
//! All three share one path: validate, gate on policy, compose an
//! idempotent job id, write the record, audit.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use autopiloot_core::idempotency::idempotency_key;
use autopiloot_core::time::format_for_filename;
use autopiloot_policy::{decide, Decision, JobContext, QuotaUsage, SystemState};
use autopiloot_providers::youtube::UNITS_PER_CHANNEL_SCAN;
use autopiloot_store::InsertOutcome;
use autopiloot_types::{
    JobInputs, JobPriority, JobRecord, JobStatus, PolicyOverrides, VideoStatus,
};

use crate::audit;
use crate::error::OrchestratorError;
use crate::{policy_limits, CoreHandles};

/// Result of a dispatch attempt. Rejections are outcomes, not errors:
/// the decision is recorded and the caller moves on.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Dispatched {
        job_ref: String,
        job_id: String,
        priority: JobPriority,
        estimated_cost_usd: Option<f64>,
        estimated_quota_units: Option<u64>,
    },
    AlreadyExists {
        job_ref: String,
    },
    Rejected {
        reason: String,
    },
}

pub struct Orchestrator {
    pub handles: CoreHandles,
}

impl Orchestrator {
    pub fn new(handles: CoreHandles) -> Self {
        Self { handles }
    }

    /// Snapshot of quota counters and the cost ledger as-of the last
    /// commit. Not transactional with the dispatch decision; accounting is
    /// at-least-once.
    pub async fn system_state(&self) -> Result<SystemState, OrchestratorError> {
        let today = Utc::now().date_naive();
        let store = &self.handles.store;
        Ok(SystemState {
            quota_usage: QuotaUsage {
                youtube_units_used: store.get_quota_usage(today, "youtube").await?,
                assemblyai_jobs_used: store.get_quota_usage(today, "assemblyai").await?,
            },
            daily_costs: store.get_daily_costs(today).await?,
            checkpoint: None,
        })
    }

    /// Dispatch a work order to the agent that owns the job type.
    pub async fn dispatch(
        &self,
        inputs: JobInputs,
        policy_overrides: PolicyOverrides,
    ) -> Result<DispatchOutcome, OrchestratorError> {
        let job_type = inputs.job_type();
        validate_inputs(&inputs)?;

        let now = Utc::now();
        let job_id = format!("{}_{}", job_type.as_str(), format_for_filename(now));
        let job_ref = format!("jobs/{}/active/{}", job_type.agent().as_str(), job_id);

        // One active job per (video, operation): a dispatch whose target is
        // already covered collapses into the existing work order.
        if job_type.is_transcription() || job_type.is_summarization() {
            let operation = if job_type.is_transcription() {
                "transcription"
            } else {
                "summarization"
            };
            for video_id in inputs.video_ids() {
                if let Some(existing) = self
                    .handles
                    .store
                    .find_active_job_for_video(job_type.agent(), video_id)
                    .await?
                {
                    debug!(
                        key = %idempotency_key(video_id, operation),
                        existing_job = %existing.job_id,
                        "dispatch collapsed into active job"
                    );
                    return Ok(DispatchOutcome::AlreadyExists {
                        job_ref: format!(
                            "jobs/{}/active/{}",
                            job_type.agent().as_str(),
                            existing.job_id
                        ),
                    });
                }
            }
        }

        // Summarizer prerequisite: every target must be sitting at
        // `transcribed`.
        if job_type.is_summarization() {
            if let Some(reason) = self.summary_prerequisite_gap(&inputs).await? {
                self.handles
                    .audit
                    .job_dispatch_rejected(&job_id, job_type, &reason)
                    .await;
                return Ok(DispatchOutcome::Rejected { reason });
            }
        }

        // Gate quotas and budget before enqueuing, with a fresh context.
        let video_count = inputs.video_ids().len().max(1) as u32;
        let ctx = JobContext::for_dispatch(job_id.clone(), job_type, video_count);
        let state = self.system_state().await?;
        let limits = policy_limits(&self.handles.config);
        match decide(&ctx, &state, Some(&policy_overrides), &limits, now) {
            Decision::Proceed => {}
            Decision::Dlq { reason } if reason.starts_with("budget exceeded") => {
                let reason = format!("budget_limit_usd exceeded ({reason})");
                self.handles
                    .audit
                    .job_dispatch_rejected(&job_id, job_type, &reason)
                    .await;
                return Ok(DispatchOutcome::Rejected { reason });
            }
            Decision::RetryIn { delay_sec, reason } => {
                let reason = format!("{reason}; retry in {delay_sec}s");
                self.handles
                    .audit
                    .job_dispatch_rejected(&job_id, job_type, &reason)
                    .await;
                return Ok(DispatchOutcome::Rejected { reason });
            }
            Decision::Skip { reason } | Decision::Dlq { reason } => {
                self.handles
                    .audit
                    .job_dispatch_rejected(&job_id, job_type, &reason)
                    .await;
                return Ok(DispatchOutcome::Rejected { reason });
            }
        }

        let priority = derive_priority(&inputs);
        let (estimated_quota_units, estimated_cost_usd, estimated_output_tokens) =
            self.estimates(&inputs);

        let job = JobRecord {
            job_id: job_id.clone(),
            inputs,
            policy_overrides,
            status: JobStatus::Pending,
            retry_count: 0,
            priority,
            created_at: now,
            created_by: audit::ACTOR.to_string(),
            last_attempt_at: None,
            last_error_type: None,
            estimated_quota_units,
            estimated_cost_usd,
            estimated_output_tokens,
        };

        match self.handles.store.insert_job(&job).await? {
            InsertOutcome::AlreadyExists => Ok(DispatchOutcome::AlreadyExists { job_ref }),
            InsertOutcome::Inserted => {
                self.handles
                    .audit
                    .job_dispatched(&job_id, job_type, job_type.agent())
                    .await;
                info!(%job_id, job_type = job_type.as_str(), "job dispatched");
                Ok(DispatchOutcome::Dispatched {
                    job_ref,
                    job_id,
                    priority,
                    estimated_cost_usd,
                    estimated_quota_units,
                })
            }
        }
    }

    async fn summary_prerequisite_gap(
        &self,
        inputs: &JobInputs,
    ) -> Result<Option<String>, OrchestratorError> {
        for video_id in inputs.video_ids() {
            match self.handles.store.get_video(video_id).await? {
                None => {
                    return Ok(Some(format!("prerequisites not met: video {video_id} not found")))
                }
                Some(video) if video.status != VideoStatus::Transcribed => {
                    return Ok(Some(format!(
                        "prerequisites not met: video {video_id} is {}, expected transcribed",
                        video.status
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(None)
    }

    fn estimates(&self, inputs: &JobInputs) -> (Option<u64>, Option<f64>, Option<u64>) {
        match inputs {
            JobInputs::ChannelScrape { channels, .. } => (
                Some(channels.len() as u64 * UNITS_PER_CHANNEL_SCAN),
                None,
                None,
            ),
            JobInputs::SheetBackfill { .. } => (None, None, None),
            JobInputs::SingleVideo { .. } => (None, Some(0.5), None),
            JobInputs::BatchTranscribe { video_ids, .. } => {
                (None, Some(video_ids.len() as f64 * 0.5), None)
            }
            JobInputs::SingleSummary { .. } => (
                None,
                None,
                Some(self.handles.config.llm.default.max_output_tokens),
            ),
            JobInputs::BatchSummarize { .. } => (None, None, None),
        }
    }
}

fn validate_inputs(inputs: &JobInputs) -> Result<(), OrchestratorError> {
    let fail = |msg: &str| Err(OrchestratorError::Validation(msg.to_string()));
    match inputs {
        JobInputs::ChannelScrape { channels, .. } => {
            if channels.is_empty() {
                return fail("channel_scrape requires a non-empty channels list");
            }
            if channels.iter().any(|c| c.trim().is_empty()) {
                return fail("channel_scrape channels must be non-blank handles");
            }
        }
        JobInputs::SheetBackfill { sheet_id, .. } => {
            if sheet_id.trim().is_empty() {
                return fail("sheet_backfill requires a sheet_id");
            }
        }
        JobInputs::SingleVideo { video_id, .. } | JobInputs::SingleSummary { video_id, .. } => {
            if video_id.trim().is_empty() {
                return fail("a video_id is required");
            }
        }
        JobInputs::BatchTranscribe { video_ids, .. }
        | JobInputs::BatchSummarize { video_ids, .. } => {
            if video_ids.is_empty() {
                return fail("a non-empty video_ids list is required");
            }
        }
    }
    Ok(())
}

fn derive_priority(inputs: &JobInputs) -> JobPriority {
    match inputs {
        JobInputs::ChannelScrape { .. } => JobPriority::High,
        JobInputs::SheetBackfill { .. } => JobPriority::Medium,
        JobInputs::SingleVideo { priority, .. } => priority.unwrap_or(JobPriority::Medium),
        JobInputs::BatchTranscribe { .. } => JobPriority::Low,
        JobInputs::SingleSummary { .. } => JobPriority::Medium,
        JobInputs::BatchSummarize { .. } => JobPriority::Low,
    }
}

/// The JSON projection returned to CLI callers.
impl DispatchOutcome {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DispatchOutcome::Dispatched {
                job_ref,
                job_id,
                priority,
                estimated_cost_usd,
                estimated_quota_units,
            } => json!({
                "status": "dispatched",
                "job_ref": job_ref,
                "job_id": job_id,
                "priority": priority.as_str(),
                "estimated_cost_usd": estimated_cost_usd,
                "estimated_quota_usage": estimated_quota_units,
            }),
            DispatchOutcome::AlreadyExists { job_ref } => json!({
                "status": "already_exists",
                "job_ref": job_ref,
                "message": "Job already dispatched",
            }),
            DispatchOutcome::Rejected { reason } => json!({
                "status": "rejected",
                "reason": reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_follow_the_job_shape() {
        assert_eq!(
            derive_priority(&JobInputs::ChannelScrape {
                channels: vec!["@a".to_string()],
                limit_per_channel: None
            }),
            JobPriority::High
        );
        assert_eq!(
            derive_priority(&JobInputs::SingleVideo {
                video_id: "v".to_string(),
                priority: Some(JobPriority::High)
            }),
            JobPriority::High
        );
        assert_eq!(
            derive_priority(&JobInputs::SingleVideo {
                video_id: "v".to_string(),
                priority: None
            }),
            JobPriority::Medium
        );
        assert_eq!(
            derive_priority(&JobInputs::BatchTranscribe {
                video_ids: vec!["v".to_string()],
                batch_size: None
            }),
            JobPriority::Low
        );
    }

    #[test]
    fn empty_channel_list_is_a_validation_error() {
        let err = validate_inputs(&JobInputs::ChannelScrape {
            channels: Vec::new(),
            limit_per_channel: None,
        })
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
    }
}
