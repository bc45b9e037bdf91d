//! Agent job runners: consume active job records, execute against the
//! external collaborators, and advance per-video state. Effects per video
//! are serialized by the store's compare-and-set transitions; a runner that
//! loses a race treats the stale-state abort as someone else's success.

mod scraper;
mod summarizer;
mod transcriber;

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn, Level};

use autopiloot_observability::{emit_pipeline_event, PipelineEvent};
use autopiloot_policy::{decide, Decision, JobContext};
use autopiloot_providers::{
    classify_error, ArtifactStore, ChannelSource, SheetSource, SummarizationService,
    TranscriptionService, VectorIndex,
};
use autopiloot_types::{Agent, ErrorType, FailureContext, JobRecord, JobStatus};

use crate::dispatch::Orchestrator;
use crate::dlq::DlqRequest;
use crate::error::OrchestratorError;
use crate::policy_limits;

/// A failure produced inside a runner, already classified.
#[derive(Debug, Error)]
#[error("{error_type}: {message}")]
pub struct RunFailure {
    pub error_type: ErrorType,
    pub message: String,
}

impl RunFailure {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self {
            error_type,
            message: message.into(),
        })
    }
}

fn failure_type(err: &anyhow::Error) -> ErrorType {
    match err.downcast_ref::<RunFailure>() {
        Some(failure) => failure.error_type,
        None => classify_error(err),
    }
}

/// What happened to one job on one pass.
#[derive(Debug, Clone, PartialEq)]
pub enum JobRunOutcome {
    Completed(Value),
    Skipped(String),
    Deferred { delay_sec: u64, reason: String },
    FailedWillRetry { delay_sec: u64, error_type: ErrorType },
    RoutedToDlq { dlq_id: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dlq_routed: u64,
    pub deferred: u64,
}

/// External collaborators the runners execute against.
pub struct Collaborators {
    pub channel_source: Arc<dyn ChannelSource>,
    pub sheet_source: Option<Arc<dyn SheetSource>>,
    pub transcription: Arc<dyn TranscriptionService>,
    pub summarization: Arc<dyn SummarizationService>,
    pub vector_index: Option<Arc<dyn VectorIndex>>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

pub struct Runners {
    pub orchestrator: Arc<Orchestrator>,
    pub collaborators: Collaborators,
}

impl Runners {
    pub fn new(orchestrator: Arc<Orchestrator>, collaborators: Collaborators) -> Self {
        Self {
            orchestrator,
            collaborators,
        }
    }

    /// Drain the active queue for one agent, oldest jobs first. Jobs are
    /// processed sequentially; per-video effects stay single-writer.
    pub async fn run_pending(&self, agent: Agent) -> Result<RunStats, OrchestratorError> {
        let jobs = self.orchestrator.handles.store.list_active_jobs(agent).await?;
        let mut stats = RunStats::default();

        for job in jobs {
            stats.processed += 1;
            match self.run_job(&job).await? {
                JobRunOutcome::Completed(_) | JobRunOutcome::Skipped(_) => stats.succeeded += 1,
                JobRunOutcome::Deferred { .. } => stats.deferred += 1,
                JobRunOutcome::FailedWillRetry { .. } => stats.failed += 1,
                JobRunOutcome::RoutedToDlq { .. } => {
                    stats.failed += 1;
                    stats.dlq_routed += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Execute one job under policy control.
    pub async fn run_job(&self, job: &JobRecord) -> Result<JobRunOutcome, OrchestratorError> {
        let now = Utc::now();
        let handles = &self.orchestrator.handles;
        let limits = policy_limits(&handles.config);

        let ctx = JobContext {
            job_id: job.job_id.clone(),
            job_type: job.job_type(),
            retry_count: job.retry_count,
            last_attempt_at: job.last_attempt_at,
            error_type: job.last_error_type,
            target: None,
            estimated_cost_usd: job.estimated_cost_usd,
            video_count: job.inputs.video_ids().len().max(1) as u32,
        };
        let state = self.orchestrator.system_state().await?;

        match decide(&ctx, &state, Some(&job.policy_overrides), &limits, now) {
            Decision::Proceed => {}
            Decision::RetryIn { delay_sec, reason } => {
                return Ok(JobRunOutcome::Deferred { delay_sec, reason });
            }
            Decision::Skip { reason } => {
                handles.store.delete_job(job.agent(), &job.job_id).await?;
                handles
                    .audit
                    .job_completed(&job.job_id, job.job_type(), serde_json::json!({ "skipped": reason }))
                    .await;
                return Ok(JobRunOutcome::Skipped(reason));
            }
            Decision::Dlq { reason } => {
                return self
                    .route_to_dlq(
                        job,
                        job.last_error_type.unwrap_or(ErrorType::Other),
                        &reason,
                        job.retry_count,
                    )
                    .await;
            }
        }

        handles
            .store
            .record_job_attempt(
                job.agent(),
                &job.job_id,
                JobStatus::InProgress,
                job.retry_count,
                now,
                job.last_error_type,
            )
            .await?;

        let result = self.execute(job).await;

        match result {
            Ok(detail) => {
                handles.store.delete_job(job.agent(), &job.job_id).await?;
                handles
                    .audit
                    .job_completed(&job.job_id, job.job_type(), detail.clone())
                    .await;
                info!(job_id = %job.job_id, "job completed");
                emit_pipeline_event(
                    Level::INFO,
                    &PipelineEvent {
                        agent: Some(job.agent().as_str()),
                        job_id: Some(&job.job_id),
                        job_type: Some(job.job_type().as_str()),
                        decision: Some("proceed"),
                        ..PipelineEvent::new("job_completed")
                    },
                );
                Ok(JobRunOutcome::Completed(detail))
            }
            Err(err) => self.handle_failure(job, err).await,
        }
    }

    async fn execute(&self, job: &JobRecord) -> anyhow::Result<Value> {
        use autopiloot_types::JobInputs;
        match &job.inputs {
            JobInputs::ChannelScrape {
                channels,
                limit_per_channel,
            } => self.run_channel_scrape(job, channels, *limit_per_channel).await,
            JobInputs::SheetBackfill { sheet_id, range } => {
                self.run_sheet_backfill(sheet_id, range.as_deref()).await
            }
            JobInputs::SingleVideo { video_id, .. } => {
                self.run_transcriptions(std::slice::from_ref(video_id)).await
            }
            JobInputs::BatchTranscribe { video_ids, .. } => {
                self.run_transcriptions(video_ids).await
            }
            JobInputs::SingleSummary { video_id, platforms } => {
                self.run_summaries(std::slice::from_ref(video_id), platforms.clone())
                    .await
            }
            JobInputs::BatchSummarize { video_ids, .. } => {
                self.run_summaries(video_ids, None).await
            }
        }
    }

    async fn handle_failure(
        &self,
        job: &JobRecord,
        err: anyhow::Error,
    ) -> Result<JobRunOutcome, OrchestratorError> {
        let error_type = failure_type(&err);
        let now = Utc::now();
        let handles = &self.orchestrator.handles;
        let next_retry_count = job.retry_count + 1;
        warn!(job_id = %job.job_id, %err, error_type = error_type.as_str(), "job attempt failed");

        handles
            .store
            .record_job_attempt(
                job.agent(),
                &job.job_id,
                JobStatus::Failed,
                next_retry_count,
                now,
                Some(error_type),
            )
            .await?;

        let limits = policy_limits(&handles.config);
        let ctx = JobContext {
            job_id: job.job_id.clone(),
            job_type: job.job_type(),
            retry_count: next_retry_count,
            last_attempt_at: Some(now),
            error_type: Some(error_type),
            target: None,
            estimated_cost_usd: job.estimated_cost_usd,
            video_count: job.inputs.video_ids().len().max(1) as u32,
        };
        let state = self.orchestrator.system_state().await?;

        match decide(&ctx, &state, Some(&job.policy_overrides), &limits, now) {
            Decision::Dlq { .. } => {
                self.route_to_dlq(job, error_type, &err.to_string(), next_retry_count)
                    .await
            }
            Decision::RetryIn { delay_sec, .. } => {
                self.emit_retry_scheduled(job, error_type, delay_sec);
                Ok(JobRunOutcome::FailedWillRetry {
                    delay_sec,
                    error_type,
                })
            }
            _ => {
                // Backoff window computed from the fresh attempt.
                let delay_sec =
                    autopiloot_core::time::backoff_delay(next_retry_count, limits.base_delay_sec);
                self.emit_retry_scheduled(job, error_type, delay_sec);
                Ok(JobRunOutcome::FailedWillRetry {
                    delay_sec,
                    error_type,
                })
            }
        }
    }

    fn emit_retry_scheduled(&self, job: &JobRecord, error_type: ErrorType, delay_sec: u64) {
        let detail = format!("next attempt in {delay_sec}s");
        emit_pipeline_event(
            Level::WARN,
            &PipelineEvent {
                agent: Some(job.agent().as_str()),
                job_id: Some(&job.job_id),
                job_type: Some(job.job_type().as_str()),
                error_type: Some(error_type.as_str()),
                decision: Some("retry_in"),
                detail: Some(&detail),
                ..PipelineEvent::new("job_retry_scheduled")
            },
        );
    }

    async fn route_to_dlq(
        &self,
        job: &JobRecord,
        error_type: ErrorType,
        message: &str,
        retry_count: u32,
    ) -> Result<JobRunOutcome, OrchestratorError> {
        let request = DlqRequest {
            job_id: job.job_id.clone(),
            job_type: job.job_type(),
            failure_context: FailureContext {
                error_type,
                error_message: message.to_string(),
                retry_count,
                last_attempt_at: Some(Utc::now()),
                original_inputs: Some(job.inputs.clone()),
            },
            recovery_hints: None,
        };
        let outcome = self.orchestrator.handle_dlq(request).await?;
        let dlq_id = match outcome {
            crate::dlq::DlqOutcome::Routed { dlq_id, .. } => dlq_id,
            crate::dlq::DlqOutcome::AlreadyExists { dlq_ref } => dlq_ref,
        };
        emit_pipeline_event(
            Level::ERROR,
            &PipelineEvent {
                agent: Some(job.agent().as_str()),
                job_id: Some(&job.job_id),
                job_type: Some(job.job_type().as_str()),
                error_type: Some(error_type.as_str()),
                decision: Some("dlq"),
                detail: Some(&dlq_id),
                ..PipelineEvent::new("job_dlq_routed")
            },
        );
        Ok(JobRunOutcome::RoutedToDlq { dlq_id })
    }
}
