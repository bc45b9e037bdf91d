//! Dead-letter routing and querying.
//!
//! Routing is idempotent on the entry id, enriches the entry with
//! job-type-specific metadata, and removes the active job afterwards —
//! entry creation must never fail because cleanup did.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use autopiloot_core::time::format_for_filename;
use autopiloot_store::{DlqQuery, InsertOutcome};
use autopiloot_types::{
    DlqEntry, FailureContext, JobInputs, JobType, Platform, RecoveryHints, RecoveryPriority,
    Severity,
};

use crate::audit;
use crate::dispatch::Orchestrator;
use crate::error::OrchestratorError;

#[derive(Debug, Clone)]
pub struct DlqRequest {
    pub job_id: String,
    pub job_type: JobType,
    pub failure_context: FailureContext,
    pub recovery_hints: Option<RecoveryHints>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DlqOutcome {
    Routed {
        dlq_ref: String,
        dlq_id: String,
        severity: Severity,
        recovery_priority: RecoveryPriority,
        processing_attempts: u32,
    },
    AlreadyExists {
        dlq_ref: String,
    },
}

#[derive(Debug, Clone)]
pub struct DlqQueryRequest {
    /// Look-back window in hours; clamped to 1..=720.
    pub hours: u32,
    pub job_type: Option<JobType>,
    pub video_id: Option<String>,
    pub severity: Option<Severity>,
    /// Page size; clamped to 1..=500.
    pub limit: u32,
    pub include_statistics: bool,
}

impl Default for DlqQueryRequest {
    fn default() -> Self {
        Self {
            hours: 24,
            job_type: None,
            video_id: None,
            severity: None,
            limit: 50,
            include_statistics: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqStatistics {
    pub total_entries: u64,
    pub by_job_type: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
    pub by_error_type: BTreeMap<String, u64>,
    pub recovery_priority_distribution: BTreeMap<String, u64>,
    pub average_processing_attempts: f64,
    pub top_error_patterns: Vec<(String, u64)>,
}

#[derive(Debug, Clone)]
pub struct DlqQueryResult {
    pub entries: Vec<DlqEntry>,
    pub statistics: Option<DlqStatistics>,
}

impl Orchestrator {
    /// Route a failed job to the dead-letter queue.
    pub async fn handle_dlq(&self, request: DlqRequest) -> Result<DlqOutcome, OrchestratorError> {
        let now = Utc::now();
        let dlq_id = format!(
            "{}_{}_{}",
            request.job_type.as_str(),
            request.job_id,
            format_for_filename(now)
        );
        let dlq_ref = format!("jobs_deadletter/{dlq_id}");

        if self.handles.store.get_dlq(&dlq_id).await?.is_some() {
            return Ok(DlqOutcome::AlreadyExists { dlq_ref });
        }

        let retry_count = request.failure_context.retry_count;
        let severity = request.failure_context.error_type.severity(retry_count);
        let recovery_priority = RecoveryPriority::derive(severity, request.job_type);
        let processing_attempts = retry_count + 1; // include the original attempt

        let mut entry = DlqEntry {
            dlq_id: dlq_id.clone(),
            original_job_id: request.job_id.clone(),
            job_type: request.job_type,
            failure_context: request.failure_context,
            recovery_hints: request.recovery_hints,
            dlq_created_at: now,
            dlq_created_by: audit::ACTOR.to_string(),
            severity,
            recovery_priority,
            processing_attempts,
            video_id: None,
            video_ids: Vec::new(),
            target_channels: Vec::new(),
            estimated_quota_impact: None,
            estimated_cost_impact: None,
            target_platforms: Vec::new(),
        };
        enrich_with_job_metadata(&mut entry);

        let error_type = entry.failure_context.error_type;
        match self.handles.store.insert_dlq(&entry).await? {
            InsertOutcome::AlreadyExists => return Ok(DlqOutcome::AlreadyExists { dlq_ref }),
            InsertOutcome::Inserted => {}
        }

        // Best-effort cleanup: an entry without its active-job delete is a
        // recoverable inconsistency, the reverse is data loss.
        if let Err(err) = self
            .handles
            .store
            .delete_job(request.job_type.agent(), &request.job_id)
            .await
        {
            warn!(job_id = %request.job_id, %err, "active job cleanup failed after DLQ routing");
        }

        self.handles
            .audit
            .job_dlq_routed(&request.job_id, request.job_type, &dlq_id, error_type)
            .await;

        Ok(DlqOutcome::Routed {
            dlq_ref,
            dlq_id,
            severity,
            recovery_priority,
            processing_attempts,
        })
    }

    /// Query the dead-letter queue with optional aggregate statistics.
    pub async fn query_dlq(
        &self,
        request: &DlqQueryRequest,
    ) -> Result<DlqQueryResult, OrchestratorError> {
        let hours = request.hours.clamp(1, 720);
        let limit = request.limit.clamp(1, 500);

        let entries = self
            .handles
            .store
            .query_dlq(&DlqQuery {
                since: Some(Utc::now() - Duration::hours(hours as i64)),
                until: None,
                job_type: request.job_type,
                severity: request.severity,
                video_id: request.video_id.clone(),
                limit: Some(limit),
            })
            .await?;

        let statistics = request
            .include_statistics
            .then(|| compute_statistics(&entries));

        Ok(DlqQueryResult {
            entries,
            statistics,
        })
    }
}

fn enrich_with_job_metadata(entry: &mut DlqEntry) {
    let Some(inputs) = entry.failure_context.original_inputs.clone() else {
        return;
    };

    match inputs {
        JobInputs::ChannelScrape { channels, .. } => {
            entry.estimated_quota_impact = Some(channels.len() as u64 * 100);
            entry.target_channels = channels;
        }
        JobInputs::SheetBackfill { .. } => {}
        JobInputs::SingleVideo { video_id, .. } => {
            entry.video_id = Some(video_id);
            entry.estimated_cost_impact = Some(0.5);
        }
        JobInputs::BatchTranscribe { video_ids, .. } => {
            entry.estimated_cost_impact = Some(video_ids.len() as f64 * 0.5);
            entry.video_ids = video_ids;
        }
        JobInputs::SingleSummary {
            video_id,
            platforms,
        } => {
            entry.video_id = Some(video_id);
            entry.target_platforms = platforms.unwrap_or_else(|| vec![Platform::Drive]);
        }
        JobInputs::BatchSummarize { video_ids, .. } => {
            entry.video_ids = video_ids;
            entry.target_platforms = vec![Platform::Drive];
        }
    }
}

fn compute_statistics(entries: &[DlqEntry]) -> DlqStatistics {
    let mut by_job_type = BTreeMap::new();
    let mut by_severity = BTreeMap::new();
    let mut by_error_type = BTreeMap::new();
    let mut recovery_priority_distribution = BTreeMap::new();
    let mut attempts_total = 0u64;
    let mut attempts_count = 0u64;

    for entry in entries {
        *by_job_type
            .entry(entry.job_type.as_str().to_string())
            .or_default() += 1;
        *by_severity
            .entry(entry.severity.as_str().to_string())
            .or_default() += 1;
        *by_error_type
            .entry(entry.failure_context.error_type.as_str().to_string())
            .or_default() += 1;
        *recovery_priority_distribution
            .entry(entry.recovery_priority.as_str().to_string())
            .or_default() += 1;
        if entry.processing_attempts > 0 {
            attempts_total += entry.processing_attempts as u64;
            attempts_count += 1;
        }
    }

    let mut top_error_patterns: Vec<(String, u64)> = by_error_type
        .iter()
        .map(|(error_type, &count)| (error_type.clone(), count))
        .collect();
    top_error_patterns.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    top_error_patterns.truncate(5);

    DlqStatistics {
        total_entries: entries.len() as u64,
        by_job_type,
        by_severity,
        by_error_type,
        recovery_priority_distribution,
        average_processing_attempts: if attempts_count > 0 {
            (attempts_total as f64 / attempts_count as f64 * 100.0).round() / 100.0
        } else {
            0.0
        },
        top_error_patterns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopiloot_types::ErrorType;

    fn entry_with_inputs(inputs: JobInputs) -> DlqEntry {
        DlqEntry {
            dlq_id: "id".to_string(),
            original_job_id: "job".to_string(),
            job_type: inputs.job_type(),
            failure_context: FailureContext {
                error_type: ErrorType::ApiTimeout,
                error_message: "m".to_string(),
                retry_count: 2,
                last_attempt_at: None,
                original_inputs: Some(inputs),
            },
            recovery_hints: None,
            dlq_created_at: Utc::now(),
            dlq_created_by: "orchestrator".to_string(),
            severity: Severity::Low,
            recovery_priority: RecoveryPriority::Low,
            processing_attempts: 3,
            video_id: None,
            video_ids: Vec::new(),
            target_channels: Vec::new(),
            estimated_quota_impact: None,
            estimated_cost_impact: None,
            target_platforms: Vec::new(),
        }
    }

    #[test]
    fn channel_scrape_metadata_carries_quota_impact() {
        let mut entry = entry_with_inputs(JobInputs::ChannelScrape {
            channels: vec!["@a".to_string(), "@b".to_string()],
            limit_per_channel: None,
        });
        enrich_with_job_metadata(&mut entry);
        assert_eq!(entry.target_channels.len(), 2);
        assert_eq!(entry.estimated_quota_impact, Some(200));
    }

    #[test]
    fn batch_transcribe_metadata_carries_cost_impact() {
        let mut entry = entry_with_inputs(JobInputs::BatchTranscribe {
            video_ids: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            batch_size: None,
        });
        enrich_with_job_metadata(&mut entry);
        assert_eq!(entry.video_ids.len(), 3);
        assert_eq!(entry.estimated_cost_impact, Some(1.5));
    }

    #[test]
    fn summary_metadata_defaults_platforms_to_drive() {
        let mut entry = entry_with_inputs(JobInputs::SingleSummary {
            video_id: "v".to_string(),
            platforms: None,
        });
        enrich_with_job_metadata(&mut entry);
        assert_eq!(entry.video_id.as_deref(), Some("v"));
        assert_eq!(entry.target_platforms, vec![Platform::Drive]);
    }

    #[test]
    fn statistics_aggregate_counts_and_attempts() {
        let entries = vec![
            entry_with_inputs(JobInputs::SingleVideo {
                video_id: "a".to_string(),
                priority: None,
            }),
            entry_with_inputs(JobInputs::SingleVideo {
                video_id: "b".to_string(),
                priority: None,
            }),
        ];
        let stats = compute_statistics(&entries);
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.by_job_type["single_video"], 2);
        assert_eq!(stats.by_error_type["api_timeout"], 2);
        assert!((stats.average_processing_attempts - 3.0).abs() < 1e-9);
        assert_eq!(stats.top_error_patterns[0], ("api_timeout".to_string(), 2));
    }
}
