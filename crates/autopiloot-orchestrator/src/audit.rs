//! The single write path to the audit collection. No component writes
//! audit entries around this logger.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use autopiloot_store::StateStore;
use autopiloot_types::{Agent, AlertLevel, AuditLogEntry, ErrorType, JobType, RunSummary};

pub const ACTOR: &str = "orchestrator";

pub const ACTION_JOB_DISPATCHED: &str = "job_dispatched";
pub const ACTION_JOB_DISPATCH_REJECTED: &str = "job_dispatch_rejected";
pub const ACTION_JOB_DLQ_ROUTED: &str = "job_dlq_routed";
pub const ACTION_JOB_COMPLETED: &str = "job_completed";
pub const ACTION_RUN_REPORT: &str = "run_report";
pub const ACTION_LLM_REQUEST: &str = "llm_request";
pub const ACTION_VIDEO_REJECTED: &str = "video_rejected_non_business";
pub const ACTION_INVARIANT_VIOLATION: &str = "invariant_violation";
pub const ACTION_CHECKPOINT_ADVANCED: &str = "checkpoint_advanced";

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<StateStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    /// Append one entry. Audit writes never fail the surrounding
    /// operation; a refused append is logged and dropped.
    pub async fn log(&self, action: &str, details: Value) {
        let entry = AuditLogEntry {
            actor: ACTOR.to_string(),
            action: action.to_string(),
            timestamp: Utc::now(),
            details,
        };
        if let Err(err) = self.store.append_audit(&entry).await {
            warn!(action, %err, "failed to append audit entry");
        }
    }

    pub async fn job_dispatched(&self, job_id: &str, job_type: JobType, target_agent: Agent) {
        self.log(
            ACTION_JOB_DISPATCHED,
            json!({
                "job_id": job_id,
                "job_type": job_type.as_str(),
                "target_agent": target_agent.as_str(),
            }),
        )
        .await;
    }

    pub async fn job_dispatch_rejected(&self, job_id: &str, job_type: JobType, reason: &str) {
        self.log(
            ACTION_JOB_DISPATCH_REJECTED,
            json!({
                "job_id": job_id,
                "job_type": job_type.as_str(),
                "reason": reason,
            }),
        )
        .await;
    }

    pub async fn job_dlq_routed(
        &self,
        job_id: &str,
        job_type: JobType,
        dlq_id: &str,
        error_type: ErrorType,
    ) {
        self.log(
            ACTION_JOB_DLQ_ROUTED,
            json!({
                "job_id": job_id,
                "job_type": job_type.as_str(),
                "dlq_id": dlq_id,
                "error_type": error_type.as_str(),
            }),
        )
        .await;
    }

    pub async fn job_completed(&self, job_id: &str, job_type: JobType, detail: Value) {
        self.log(
            ACTION_JOB_COMPLETED,
            json!({
                "job_id": job_id,
                "job_type": job_type.as_str(),
                "detail": detail,
            }),
        )
        .await;
    }

    pub async fn run_report(&self, run_id: &str, summary: &RunSummary, alert_level: AlertLevel) {
        self.log(
            ACTION_RUN_REPORT,
            json!({
                "run_id": run_id,
                "planned": summary.planned,
                "succeeded": summary.succeeded,
                "failed": summary.failed,
                "dlq_count": summary.dlq_count,
                "total_cost_usd": summary.total_cost_usd,
                "alert_level": alert_level.as_str(),
            }),
        )
        .await;
    }

    /// Details must already carry the `llm_request` projection fields
    /// (model, task, tokens, latency, cost, success).
    pub async fn llm_request(&self, details: Value) {
        self.log(ACTION_LLM_REQUEST, details).await;
    }

    pub async fn video_rejected(&self, video_id: &str, content_type: &str, reason: &str) {
        self.log(
            ACTION_VIDEO_REJECTED,
            json!({
                "video_id": video_id,
                "content_type": content_type,
                "reason": reason,
            }),
        )
        .await;
    }

    pub async fn invariant_violation(&self, detail: &str) {
        self.log(ACTION_INVARIANT_VIOLATION, json!({ "detail": detail })).await;
    }

    pub async fn checkpoint_advanced(&self, service: &str, scope: &str, last_processed_id: &str) {
        self.log(
            ACTION_CHECKPOINT_ADVANCED,
            json!({
                "service": service,
                "scope": scope,
                "last_processed_id": last_processed_id,
            }),
        )
        .await;
    }
}
