//! LLM usage metrics projected from `llm_request` audit entries.
//!
//! Each audit entry's details carry: `model`, `task`, `prompt_id`,
//! `prompt_version`, `latency_ms`, `prompt_tokens`, `completion_tokens`,
//! `total_tokens`, `cost_usd`, and `success`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use autopiloot_types::AuditLogEntry;

use crate::logging::redact_text;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub total_requests: u64,
    pub requests_by_model: BTreeMap<String, u64>,
    pub requests_by_task: BTreeMap<String, u64>,
    pub average_response_time_ms: f64,
    pub p95_response_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_tokens: u64,
    pub average_tokens_per_request: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostMetrics {
    pub total_cost_usd: f64,
    pub cost_by_model: BTreeMap<String, f64>,
    pub projected_monthly_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPerformance {
    pub usage_count: u64,
    pub success_rate: f64,
    /// Weighted blend of success rate and output-length quality.
    pub effectiveness_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMetricsReport {
    pub usage_metrics: UsageMetrics,
    pub token_metrics: TokenMetrics,
    pub cost_metrics: CostMetrics,
    pub prompt_performance: BTreeMap<String, PromptPerformance>,
    pub insights: Vec<String>,
    /// Redacted payload for the external telemetry sink; `None` when no
    /// telemetry API key is configured.
    pub telemetry_export: Option<Value>,
}

/// Project the metric groups from a window of `llm_request` audit entries.
/// `telemetry_enabled` gates the redacted export payload.
pub fn collect_llm_metrics(entries: &[AuditLogEntry], telemetry_enabled: bool) -> LlmMetricsReport {
    let total_requests = entries.len() as u64;

    let mut requests_by_model = BTreeMap::new();
    let mut requests_by_task = BTreeMap::new();
    let mut cost_by_model: BTreeMap<String, f64> = BTreeMap::new();
    let mut latencies: Vec<u64> = Vec::new();
    let mut total_prompt_tokens = 0u64;
    let mut total_completion_tokens = 0u64;
    let mut total_tokens = 0u64;
    let mut total_cost = 0.0f64;

    #[derive(Default)]
    struct PromptAccumulator {
        uses: u64,
        successes: u64,
        completion_tokens: u64,
    }
    let mut prompts: BTreeMap<String, PromptAccumulator> = BTreeMap::new();

    for entry in entries {
        let details = &entry.details;
        let model = details["model"].as_str().unwrap_or("unknown").to_string();
        *requests_by_model.entry(model.clone()).or_default() += 1;
        if let Some(task) = details["task"].as_str() {
            *requests_by_task.entry(task.to_string()).or_default() += 1;
        }

        if let Some(latency) = details["latency_ms"].as_u64() {
            latencies.push(latency);
        }
        total_prompt_tokens += details["prompt_tokens"].as_u64().unwrap_or(0);
        let completion = details["completion_tokens"].as_u64().unwrap_or(0);
        total_completion_tokens += completion;
        total_tokens += details["total_tokens"].as_u64().unwrap_or(0);

        let cost = details["cost_usd"].as_f64().unwrap_or(0.0);
        total_cost += cost;
        *cost_by_model.entry(model).or_default() += cost;

        if let Some(prompt_id) = details["prompt_id"].as_str() {
            let accumulator = prompts.entry(prompt_id.to_string()).or_default();
            accumulator.uses += 1;
            if details["success"].as_bool().unwrap_or(true) {
                accumulator.successes += 1;
            }
            accumulator.completion_tokens += completion;
        }
    }

    latencies.sort_unstable();
    let average_response_time_ms = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
    };
    let p95_response_time_ms = percentile(&latencies, 0.95);

    let usage_metrics = UsageMetrics {
        total_requests,
        requests_by_model,
        requests_by_task,
        average_response_time_ms,
        p95_response_time_ms,
    };

    let token_metrics = TokenMetrics {
        total_prompt_tokens,
        total_completion_tokens,
        total_tokens,
        average_tokens_per_request: if total_requests > 0 {
            total_tokens as f64 / total_requests as f64
        } else {
            0.0
        },
    };

    let cost_metrics = CostMetrics {
        total_cost_usd: total_cost,
        cost_by_model,
        projected_monthly_usd: total_cost * 30.0,
    };

    let prompt_performance: BTreeMap<String, PromptPerformance> = prompts
        .into_iter()
        .map(|(prompt_id, acc)| {
            let success_rate = if acc.uses > 0 {
                acc.successes as f64 / acc.uses as f64 * 100.0
            } else {
                0.0
            };
            let avg_completion = if acc.uses > 0 {
                acc.completion_tokens as f64 / acc.uses as f64
            } else {
                0.0
            };
            (
                prompt_id,
                PromptPerformance {
                    usage_count: acc.uses,
                    success_rate,
                    effectiveness_score: effectiveness_score(success_rate, avg_completion),
                },
            )
        })
        .collect();

    let insights = build_insights(&usage_metrics, &token_metrics, &cost_metrics);

    let telemetry_export = if telemetry_enabled {
        Some(json!({
            "total_requests": usage_metrics.total_requests,
            "p95_response_time_ms": usage_metrics.p95_response_time_ms,
            "total_tokens": token_metrics.total_tokens,
            "total_cost_usd": cost_metrics.total_cost_usd,
            "models": usage_metrics.requests_by_model,
            // Prompt identifiers may embed customer naming; export only
            // fingerprints.
            "prompts": prompt_performance
                .keys()
                .map(|prompt_id| redact_text(prompt_id))
                .collect::<Vec<_>>(),
        }))
    } else {
        None
    };

    LlmMetricsReport {
        usage_metrics,
        token_metrics,
        cost_metrics,
        prompt_performance,
        insights,
        telemetry_export,
    }
}

/// 70% success rate, 30% output-length quality. Output quality is full
/// marks inside the 200..=1500 completion-token band, reduced outside it.
fn effectiveness_score(success_rate_pct: f64, avg_completion_tokens: f64) -> f64 {
    let length_quality = if (200.0..=1500.0).contains(&avg_completion_tokens) {
        100.0
    } else if avg_completion_tokens > 0.0 {
        60.0
    } else {
        0.0
    };
    (success_rate_pct * 0.7 + length_quality * 0.3).clamp(0.0, 100.0)
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64) * p).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn build_insights(
    usage: &UsageMetrics,
    tokens: &TokenMetrics,
    costs: &CostMetrics,
) -> Vec<String> {
    let mut insights = Vec::new();

    if costs.projected_monthly_usd > 100.0 {
        insights.push(format!(
            "Projected monthly LLM spend is ${:.0}; review model selection",
            costs.projected_monthly_usd
        ));
    }
    if usage.p95_response_time_ms > 5_000 {
        insights.push(format!(
            "Slow responses: p95 latency is {} ms",
            usage.p95_response_time_ms
        ));
    }
    if tokens.average_tokens_per_request > 4_000.0 {
        insights.push(format!(
            "Heavy requests: {:.0} tokens per call on average",
            tokens.average_tokens_per_request
        ));
    }
    if let Some((model, &count)) = usage.requests_by_model.iter().max_by_key(|(_, &c)| c) {
        if usage.total_requests > 0 && count as f64 / usage.total_requests as f64 > 0.8 {
            insights.push(format!(
                "Single-model concentration: {model} serves {count} of {} requests",
                usage.total_requests
            ));
        }
    }

    insights
}
