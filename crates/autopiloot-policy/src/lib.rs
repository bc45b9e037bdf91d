//! Centralized reliability policy for job execution.
//!
//! [`decide`] is a pure function over the job context, a snapshot of system
//! state, and optional per-call overrides. It returns exactly one of four
//! outcomes; callers own the side effects. Checks run in a fixed order so
//! the cheap and terminal ones come first and a quota-caused failure never
//! consumes budget accounting.

pub mod model;

pub use model::{Decision, JobContext, PolicyLimits, QuotaUsage, SystemState, TargetItem};

use chrono::{DateTime, Utc};

use autopiloot_core::time::{backoff_delay, seconds_until_utc_midnight};
use autopiloot_types::PolicyOverrides;

pub const DEFAULT_QUOTA_THRESHOLD: f64 = 0.9;
pub const DEFAULT_COST_PER_VIDEO_USD: f64 = 0.5;

/// Evaluate the reliability policy for one job.
///
/// Check order (deterministic):
/// 1. retry budget and terminal errors
/// 2. service quota utilization
/// 3. daily transcription budget
/// 4. exponential-backoff timing
/// 5. checkpoint (already-processed) skip
pub fn decide(
    ctx: &JobContext,
    state: &SystemState,
    overrides: Option<&PolicyOverrides>,
    limits: &PolicyLimits,
    now: DateTime<Utc>,
) -> Decision {
    let max_attempts = overrides
        .and_then(|o| o.max_attempts)
        .unwrap_or(limits.max_attempts);
    let base_delay_sec = overrides
        .and_then(|o| o.base_delay_sec)
        .unwrap_or(limits.base_delay_sec);
    let quota_threshold = overrides
        .and_then(|o| o.quota_threshold)
        .unwrap_or(DEFAULT_QUOTA_THRESHOLD);

    // 1. Retry budget, then terminal error classification.
    if ctx.retry_count >= max_attempts {
        return Decision::Dlq {
            reason: format!(
                "max attempts exceeded ({}/{})",
                ctx.retry_count, max_attempts
            ),
        };
    }
    if let Some(error_type) = ctx.error_type {
        if error_type.is_terminal() {
            return Decision::Dlq {
                reason: format!("terminal error: {error_type}"),
            };
        }
    }

    // 2. Quota gates. Utilization at the threshold already throttles.
    if ctx.job_type.is_discovery() {
        if let Some(decision) = quota_gate(
            "youtube",
            state.quota_usage.youtube_units_used,
            limits.youtube_daily_limit,
            quota_threshold,
            now,
        ) {
            return decision;
        }
    }
    if ctx.job_type.is_transcription() {
        if let Some(decision) = quota_gate(
            "assemblyai",
            state.quota_usage.assemblyai_jobs_used,
            limits.assemblyai_daily_limit,
            quota_threshold,
            now,
        ) {
            return decision;
        }

        // 3. Budget gate, only for billable transcription dispatch. The
        // ledger snapshot is read as-of the last commit; accounting is
        // at-least-once by design review, not tightened here.
        let estimated_cost = ctx
            .estimated_cost_usd
            .unwrap_or(ctx.video_count.max(1) as f64 * DEFAULT_COST_PER_VIDEO_USD);
        let configured_budget = limits.transcription_daily_budget_usd;
        let effective_budget = overrides
            .and_then(|o| o.budget_limit_usd)
            .map(|limit| limit.min(configured_budget))
            .unwrap_or(configured_budget);
        let spent_today = state
            .daily_costs
            .map(|costs| costs.transcription_usd)
            .unwrap_or(0.0);
        let available = effective_budget - spent_today;
        if estimated_cost > available {
            return Decision::Dlq {
                reason: format!(
                    "budget exceeded: estimated ${estimated_cost:.2} over available ${:.2}",
                    available.max(0.0)
                ),
            };
        }
    }

    // 4. Backoff timing for retried jobs.
    if ctx.retry_count > 0 {
        let required = backoff_delay(ctx.retry_count, base_delay_sec);
        if let Some(last_attempt_at) = ctx.last_attempt_at {
            let elapsed = (now - last_attempt_at).num_seconds().max(0) as u64;
            if elapsed < required {
                return Decision::RetryIn {
                    delay_sec: required - elapsed,
                    reason: format!("backoff unsatisfied (retry #{})", ctx.retry_count),
                };
            }
        }
    }

    // 5. Checkpoint: skip units the incremental cursor has already passed.
    if let (Some(target), Some(checkpoint)) = (&ctx.target, &state.checkpoint) {
        if checkpoint.last_processed_id.as_deref() == Some(target.video_id.as_str()) {
            return Decision::Skip {
                reason: format!("checkpoint already covers {}", target.video_id),
            };
        }
        if let (Some(published_at), Some(high_water)) =
            (target.published_at, checkpoint.last_published_at)
        {
            if published_at <= high_water {
                return Decision::Skip {
                    reason: format!(
                        "checkpoint already covers items published up to {high_water}"
                    ),
                };
            }
        }
    }

    Decision::Proceed
}

fn quota_gate(
    service: &str,
    used: u64,
    limit: u64,
    threshold: f64,
    now: DateTime<Utc>,
) -> Option<Decision> {
    if limit == 0 {
        return None;
    }
    let utilization = used as f64 / limit as f64;
    if utilization >= threshold {
        Some(Decision::RetryIn {
            delay_sec: seconds_until_utc_midnight(now),
            reason: format!(
                "quota threshold exceeded for {service} ({:.1}%)",
                utilization * 100.0
            ),
        })
    } else {
        None
    }
}
