//! Daily operational summary: one report object per UTC day, derived from
//! store snapshots, with a Slack block payload ready for the sink.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use autopiloot_types::{AuditLogEntry, DailyCosts, DlqEntry, VideoRecord, VideoStatus};

use crate::health::{health_score, health_status};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub service: String,
    pub used: u64,
    pub limit: u64,
}

/// Raw material for one day's report, gathered by the caller from the
/// state store.
#[derive(Debug, Clone)]
pub struct DailySummaryInputs {
    pub date: NaiveDate,
    /// Videos whose records were created on the target day.
    pub videos_discovered: Vec<VideoRecord>,
    /// Videos whose records were updated on the target day.
    pub videos_updated: Vec<VideoRecord>,
    /// `job_dispatched` audit entries from the target day.
    pub dispatched_jobs: Vec<AuditLogEntry>,
    /// DLQ entries created on the target day.
    pub dlq_entries: Vec<DlqEntry>,
    pub costs: Option<DailyCosts>,
    pub daily_budget_usd: f64,
    pub quota: Vec<QuotaSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetrics {
    pub total_discovered: u64,
    pub total_processed: u64,
    pub processing_rate: f64,
    pub by_source: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetrics {
    pub total_jobs: u64,
    pub failed_jobs: u64,
    pub by_agent: BTreeMap<String, u64>,
    pub by_type: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostMetrics {
    pub total_cost: f64,
    pub transcription_cost: f64,
    pub llm_cost: f64,
    pub budget_utilization: f64,
    pub cost_per_video: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub total_errors: u64,
    pub error_types: BTreeMap<String, u64>,
    pub severity_distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaMetric {
    pub used: u64,
    pub limit: u64,
    pub utilization_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub processing_efficiency: f64,
    pub cost_efficiency: f64,
    pub reliability_score: f64,
    pub overall_health_score: f64,
    pub health_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummaryReport {
    pub report_date: NaiveDate,
    pub video_metrics: VideoMetrics,
    pub job_metrics: JobMetrics,
    pub cost_metrics: CostMetrics,
    pub error_metrics: ErrorMetrics,
    pub quota_metrics: BTreeMap<String, QuotaMetric>,
    pub performance: PerformanceMetrics,
    pub insights: Vec<String>,
    pub slack_blocks: Vec<Value>,
}

pub fn build_daily_summary(inputs: &DailySummaryInputs) -> DailySummaryReport {
    let video_metrics = build_video_metrics(inputs);
    let job_metrics = build_job_metrics(inputs);
    let cost_metrics = build_cost_metrics(inputs, video_metrics.total_processed);
    let error_metrics = build_error_metrics(inputs);

    let mut quota_metrics = BTreeMap::new();
    let mut utilizations = Vec::new();
    for snapshot in &inputs.quota {
        let utilization = if snapshot.limit > 0 {
            snapshot.used as f64 / snapshot.limit as f64
        } else {
            0.0
        };
        utilizations.push(utilization);
        quota_metrics.insert(
            snapshot.service.clone(),
            QuotaMetric {
                used: snapshot.used,
                limit: snapshot.limit,
                utilization_percent: utilization * 100.0,
            },
        );
    }

    let dlq_rate = if job_metrics.total_jobs > 0 {
        error_metrics.total_errors as f64 / job_metrics.total_jobs as f64
    } else if error_metrics.total_errors > 0 {
        1.0
    } else {
        0.0
    };
    let overall = health_score(video_metrics.processing_rate, dlq_rate, &utilizations);

    let performance = PerformanceMetrics {
        processing_efficiency: video_metrics.processing_rate,
        cost_efficiency: cost_metrics.cost_per_video,
        reliability_score: (1.0 - dlq_rate.clamp(0.0, 1.0)) * 100.0,
        overall_health_score: overall,
        health_status: health_status(overall).to_string(),
    };

    let insights = build_insights(&video_metrics, &cost_metrics, &error_metrics);
    let slack_blocks = build_slack_blocks(
        inputs.date,
        &video_metrics,
        &cost_metrics,
        &error_metrics,
        &performance,
        &insights,
    );

    DailySummaryReport {
        report_date: inputs.date,
        video_metrics,
        job_metrics,
        cost_metrics,
        error_metrics,
        quota_metrics,
        performance,
        insights,
        slack_blocks,
    }
}

fn build_video_metrics(inputs: &DailySummaryInputs) -> VideoMetrics {
    let total_discovered = inputs.videos_discovered.len() as u64;
    let total_processed = inputs
        .videos_updated
        .iter()
        .filter(|v| v.status == VideoStatus::Summarized)
        .count() as u64;

    let mut by_source = BTreeMap::new();
    for video in &inputs.videos_discovered {
        *by_source.entry(video.source.as_str().to_string()).or_default() += 1;
    }

    let processing_rate = if total_discovered > 0 {
        total_processed as f64 / total_discovered as f64
    } else {
        0.0
    };

    VideoMetrics {
        total_discovered,
        total_processed,
        processing_rate,
        by_source,
    }
}

fn build_job_metrics(inputs: &DailySummaryInputs) -> JobMetrics {
    let mut by_agent = BTreeMap::new();
    let mut by_type = BTreeMap::new();
    for entry in &inputs.dispatched_jobs {
        if let Some(agent) = entry.details["target_agent"].as_str() {
            *by_agent.entry(agent.to_string()).or_default() += 1;
        }
        if let Some(job_type) = entry.details["job_type"].as_str() {
            *by_type.entry(job_type.to_string()).or_default() += 1;
        }
    }

    JobMetrics {
        total_jobs: inputs.dispatched_jobs.len() as u64,
        failed_jobs: inputs.dlq_entries.len() as u64,
        by_agent,
        by_type,
    }
}

fn build_cost_metrics(inputs: &DailySummaryInputs, processed: u64) -> CostMetrics {
    let (total, transcription, llm) = match inputs.costs {
        Some(costs) => (costs.total_usd, costs.transcription_usd, costs.llm_usd),
        None => (0.0, 0.0, 0.0),
    };

    CostMetrics {
        total_cost: total,
        transcription_cost: transcription,
        llm_cost: llm,
        budget_utilization: if inputs.daily_budget_usd > 0.0 {
            total / inputs.daily_budget_usd
        } else {
            0.0
        },
        cost_per_video: if processed > 0 {
            total / processed as f64
        } else {
            0.0
        },
    }
}

fn build_error_metrics(inputs: &DailySummaryInputs) -> ErrorMetrics {
    let mut error_types = BTreeMap::new();
    let mut severity_distribution = BTreeMap::new();
    for entry in &inputs.dlq_entries {
        *error_types
            .entry(entry.failure_context.error_type.as_str().to_string())
            .or_default() += 1;
        *severity_distribution
            .entry(entry.severity.as_str().to_string())
            .or_default() += 1;
    }

    ErrorMetrics {
        total_errors: inputs.dlq_entries.len() as u64,
        error_types,
        severity_distribution,
    }
}

fn build_insights(
    video_metrics: &VideoMetrics,
    cost_metrics: &CostMetrics,
    error_metrics: &ErrorMetrics,
) -> Vec<String> {
    let mut insights = Vec::new();

    if video_metrics.total_discovered > 0 && video_metrics.processing_rate < 0.7 {
        insights.push(format!(
            "Low processing rate: only {:.0}% of discovered videos reached a summary",
            video_metrics.processing_rate * 100.0
        ));
    }
    if cost_metrics.budget_utilization > 0.8 {
        insights.push(format!(
            "High budget utilization: {:.0}% of the daily budget is spent",
            cost_metrics.budget_utilization * 100.0
        ));
    }
    if error_metrics.total_errors > 10 {
        insights.push(format!(
            "Elevated failures: {} DLQ entries today",
            error_metrics.total_errors
        ));
    }
    if let Some((dominant, count)) = error_metrics.error_types.iter().max_by_key(|(_, &c)| c) {
        if error_metrics.total_errors > 0 && *count * 2 > error_metrics.total_errors {
            insights.push(format!(
                "Dominant error cluster: {dominant} accounts for {count} of {} failures",
                error_metrics.total_errors
            ));
        }
    }

    insights
}

fn build_slack_blocks(
    date: NaiveDate,
    video_metrics: &VideoMetrics,
    cost_metrics: &CostMetrics,
    error_metrics: &ErrorMetrics,
    performance: &PerformanceMetrics,
    insights: &[String],
) -> Vec<Value> {
    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("Autopiloot Daily Summary — {date}")
            }
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Videos:* {} discovered / {} processed", video_metrics.total_discovered, video_metrics.total_processed) },
                { "type": "mrkdwn", "text": format!("*Processing rate:* {:.0}%", video_metrics.processing_rate * 100.0) },
                { "type": "mrkdwn", "text": format!("*Cost:* ${:.2} ({:.0}% of budget)", cost_metrics.total_cost, cost_metrics.budget_utilization * 100.0) },
                { "type": "mrkdwn", "text": format!("*Errors:* {}", error_metrics.total_errors) },
                { "type": "mrkdwn", "text": format!("*Health:* {:.0}/100 ({})", performance.overall_health_score, performance.health_status) }
            ]
        }),
    ];

    if !insights.is_empty() {
        blocks.push(json!({
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*Insights:*\n• {}", insights.join("\n• "))
            }
        }));
    }

    blocks
}
