//! Run-event emission: a formatted operational report for the notification
//! sink plus the audit trail entry, with the derived health metrics.

use serde_json::{json, Value};
use tracing::{warn, Level};
use uuid::Uuid;

use autopiloot_core::time::format_duration_human;
use autopiloot_observability::{
    emit_pipeline_event, health_score, status_icon, PipelineEvent,
};
use autopiloot_providers::NotificationSink;
use autopiloot_types::{AlertLevel, RunContext, RunSummary};

use crate::dispatch::Orchestrator;
use crate::error::OrchestratorError;

#[derive(Debug, Clone, Default)]
pub struct OperationalInsights {
    pub bottlenecks: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunEventReport {
    pub event_id: String,
    pub alert_level: AlertLevel,
    pub health_score: f64,
    pub success_rate: f64,
    pub status_icon: &'static str,
    pub delivered: bool,
    pub blocks: Vec<Value>,
}

impl Orchestrator {
    pub async fn emit_run_events(
        &self,
        summary: &RunSummary,
        context: &RunContext,
        insights: Option<&OperationalInsights>,
        alert_level: AlertLevel,
        sink: &dyn NotificationSink,
    ) -> Result<RunEventReport, OrchestratorError> {
        let event_id = format!("run_event_{}", Uuid::new_v4().simple());

        let success_rate = if summary.planned > 0 {
            summary.succeeded as f64 / summary.planned as f64
        } else {
            0.0
        };
        let dlq_rate = if summary.planned > 0 {
            summary.dlq_count as f64 / summary.planned as f64
        } else {
            0.0
        };
        let quota_utilizations: Vec<f64> = summary.quota_state.values().copied().collect();
        let score = health_score(success_rate, dlq_rate, &quota_utilizations);
        let icon = status_icon(alert_level, success_rate);

        let blocks = build_blocks(summary, context, insights, success_rate, icon);

        let channel = &self.handles.config.notifications.slack.channel;
        let delivered = match sink.post(channel, blocks.clone()).await {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "run report delivery failed");
                false
            }
        };

        self.handles
            .audit
            .run_report(&context.run_id, summary, alert_level)
            .await;

        let detail = format!(
            "health {score:.0}, {}/{} succeeded, {} dlq",
            summary.succeeded, summary.planned, summary.dlq_count
        );
        let level = match alert_level {
            AlertLevel::Error | AlertLevel::Critical => Level::ERROR,
            AlertLevel::Warning => Level::WARN,
            AlertLevel::Info => Level::INFO,
        };
        emit_pipeline_event(
            level,
            &PipelineEvent {
                run_id: Some(&context.run_id),
                detail: Some(&detail),
                ..PipelineEvent::new("run_report_emitted")
            },
        );

        Ok(RunEventReport {
            event_id,
            alert_level,
            health_score: score,
            success_rate,
            status_icon: icon,
            delivered,
            blocks,
        })
    }
}

fn build_blocks(
    summary: &RunSummary,
    context: &RunContext,
    insights: Option<&OperationalInsights>,
    success_rate: f64,
    icon: &str,
) -> Vec<Value> {
    let quota_text = summary
        .quota_state
        .iter()
        .map(|(service, utilization)| format!("{service}: {:.0}%", utilization * 100.0))
        .collect::<Vec<_>>()
        .join(", ");

    let duration_sec = (context.duration_hours() * 3600.0).round() as u64;

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("{icon} Autopiloot Run Report: {}", context.run_id)
            }
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Success rate:* {:.1}% ({}/{} planned)", success_rate * 100.0, summary.succeeded, summary.planned) },
                { "type": "mrkdwn", "text": format!("*Failed jobs:* {} (DLQ: {})", summary.failed, summary.dlq_count) },
                { "type": "mrkdwn", "text": format!("*Quota usage:* {}", if quota_text.is_empty() { "no quota data".to_string() } else { quota_text }) },
                { "type": "mrkdwn", "text": format!("*Total cost:* ${:.2}", summary.total_cost_usd) },
                { "type": "mrkdwn", "text": format!("*Duration:* {}", format_duration_human(duration_sec)) }
            ]
        }),
    ];

    if let Some(insights) = insights {
        let mut lines = Vec::new();
        if !insights.bottlenecks.is_empty() {
            lines.push(format!("*Bottlenecks:* {}", insights.bottlenecks.join(", ")));
        }
        if !insights.recommendations.is_empty() {
            lines.push(format!(
                "*Recommendations:* {}",
                insights.recommendations.join(", ")
            ));
        }
        if !lines.is_empty() {
            blocks.push(json!({
                "type": "section",
                "text": { "type": "mrkdwn", "text": lines.join("\n") }
            }));
        }
    }

    blocks
}
