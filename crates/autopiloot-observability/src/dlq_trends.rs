//! Dead-letter trend analysis: failure rates against a baseline window,
//! dominant error patterns, temporal clustering, and pattern-keyed
//! operational recommendations.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use autopiloot_types::{DlqEntry, ErrorType};

#[derive(Debug, Clone, Copy)]
pub struct TrendOptions {
    /// Analysis window; clamped to 1..=168 hours.
    pub window_hours: u32,
    /// Current rate must exceed baseline by this multiplier to alert;
    /// clamped to 1.0..=10.0.
    pub spike_threshold: f64,
    pub include_recommendations: bool,
}

impl Default for TrendOptions {
    fn default() -> Self {
        Self {
            window_hours: 24,
            spike_threshold: 2.0,
            include_recommendations: true,
        }
    }
}

impl TrendOptions {
    fn clamped(self) -> Self {
        Self {
            window_hours: self.window_hours.clamp(1, 168),
            spike_threshold: self.spike_threshold.clamp(1.0, 10.0),
            include_recommendations: self.include_recommendations,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub total_entries: u64,
    pub entries_per_hour: f64,
    /// `increasing`, `decreasing`, or `stable` against the prior window.
    pub failure_rate_trend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopError {
    pub error_type: String,
    pub count: u64,
    pub percentage: f64,
    pub recent_examples: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDistribution {
    pub by_agent: BTreeMap<String, u64>,
    pub by_job_type: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePatterns {
    pub top_errors: Vec<TopError>,
    pub error_distribution: ErrorDistribution,
    pub affected_agents: BTreeMap<String, u64>,
    /// retry_count value -> number of entries that died at it.
    pub retry_analysis: BTreeMap<u32, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureVelocity {
    pub current_rate_per_min: f64,
    pub baseline_rate_per_min: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalAnalysis {
    /// UTC hour (00..23) -> entry count.
    pub hourly_breakdown: BTreeMap<String, u64>,
    pub peak_failure_times: Vec<String>,
    pub failure_velocity: FailureVelocity,
    pub burst_detected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAlert {
    pub severity: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    pub priority: String,
    pub action: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqTrendReport {
    pub analysis_timestamp: DateTime<Utc>,
    pub analysis_window: AnalysisWindow,
    pub trend_analysis: TrendAnalysis,
    pub failure_patterns: FailurePatterns,
    pub temporal_analysis: TemporalAnalysis,
    pub alerts: Vec<TrendAlert>,
    pub recommendations: Vec<Recommendation>,
}

/// Analyze the current window against the immediately preceding one.
/// `current` holds entries inside the window, `previous` the baseline.
pub fn analyze_dlq_trends(
    current: &[DlqEntry],
    previous: &[DlqEntry],
    options: TrendOptions,
    now: DateTime<Utc>,
) -> DlqTrendReport {
    let options = options.clamped();
    let window = AnalysisWindow {
        start_time: now - Duration::hours(options.window_hours as i64),
        end_time: now,
        duration_hours: options.window_hours,
    };

    let total = current.len() as u64;
    let entries_per_hour = total as f64 / options.window_hours as f64;
    let baseline_per_hour = previous.len() as f64 / options.window_hours as f64;

    let failure_rate_trend = if entries_per_hour > baseline_per_hour * 1.2 {
        "increasing"
    } else if entries_per_hour < baseline_per_hour * 0.8 {
        "decreasing"
    } else {
        "stable"
    }
    .to_string();

    let failure_patterns = build_failure_patterns(current);
    let temporal_analysis = build_temporal_analysis(
        current,
        entries_per_hour,
        baseline_per_hour,
        options.spike_threshold,
    );

    let mut alerts = Vec::new();
    if baseline_per_hour > 0.0 && entries_per_hour >= baseline_per_hour * options.spike_threshold {
        let magnitude = entries_per_hour / baseline_per_hour;
        let severity = if magnitude >= options.spike_threshold * 2.0 {
            "critical"
        } else {
            "warning"
        };
        alerts.push(TrendAlert {
            severity: severity.to_string(),
            message: format!(
                "DLQ rate {entries_per_hour:.1}/h is {magnitude:.1}x the prior window ({baseline_per_hour:.1}/h)"
            ),
        });
    } else if baseline_per_hour == 0.0 && total > 0 && entries_per_hour >= options.spike_threshold {
        alerts.push(TrendAlert {
            severity: "warning".to_string(),
            message: format!("DLQ entries appeared at {entries_per_hour:.1}/h after a quiet window"),
        });
    }

    let recommendations = if options.include_recommendations {
        build_recommendations(&failure_patterns)
    } else {
        Vec::new()
    };

    DlqTrendReport {
        analysis_timestamp: now,
        analysis_window: window,
        trend_analysis: TrendAnalysis {
            total_entries: total,
            entries_per_hour,
            failure_rate_trend,
        },
        failure_patterns,
        temporal_analysis,
        alerts,
        recommendations,
    }
}

fn build_failure_patterns(entries: &[DlqEntry]) -> FailurePatterns {
    let mut by_error: BTreeMap<String, (u64, Vec<String>)> = BTreeMap::new();
    let mut by_agent: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_job_type: BTreeMap<String, u64> = BTreeMap::new();
    let mut retry_analysis: BTreeMap<u32, u64> = BTreeMap::new();

    for entry in entries {
        let slot = by_error
            .entry(entry.failure_context.error_type.as_str().to_string())
            .or_default();
        slot.0 += 1;
        if slot.1.len() < 3 {
            slot.1.push(entry.failure_context.error_message.clone());
        }

        *by_agent
            .entry(entry.job_type.agent().as_str().to_string())
            .or_default() += 1;
        *by_job_type
            .entry(entry.job_type.as_str().to_string())
            .or_default() += 1;
        *retry_analysis
            .entry(entry.failure_context.retry_count)
            .or_default() += 1;
    }

    let total = entries.len().max(1) as f64;
    let mut top_errors: Vec<TopError> = by_error
        .into_iter()
        .map(|(error_type, (count, recent_examples))| TopError {
            error_type,
            count,
            percentage: count as f64 / total * 100.0,
            recent_examples,
        })
        .collect();
    top_errors.sort_by(|a, b| b.count.cmp(&a.count).then(a.error_type.cmp(&b.error_type)));
    top_errors.truncate(5);

    FailurePatterns {
        top_errors,
        error_distribution: ErrorDistribution {
            by_agent: by_agent.clone(),
            by_job_type,
        },
        affected_agents: by_agent,
        retry_analysis,
    }
}

fn build_temporal_analysis(
    entries: &[DlqEntry],
    entries_per_hour: f64,
    baseline_per_hour: f64,
    spike_threshold: f64,
) -> TemporalAnalysis {
    let mut hourly: BTreeMap<String, u64> = BTreeMap::new();
    for entry in entries {
        let hour = format!("{:02}:00", entry.dlq_created_at.hour());
        *hourly.entry(hour).or_default() += 1;
    }

    let peak = hourly.values().copied().max().unwrap_or(0);
    let peak_failure_times: Vec<String> = hourly
        .iter()
        .filter(|(_, &count)| count == peak && peak > 0)
        .map(|(hour, _)| hour.clone())
        .collect();

    // Burst: any single hour holds more than spike_threshold times the
    // even-spread expectation.
    let burst_detected = peak as f64 > entries_per_hour.max(1.0) * spike_threshold;

    TemporalAnalysis {
        hourly_breakdown: hourly,
        peak_failure_times,
        failure_velocity: FailureVelocity {
            current_rate_per_min: entries_per_hour / 60.0,
            baseline_rate_per_min: baseline_per_hour / 60.0,
        },
        burst_detected,
    }
}

fn build_recommendations(patterns: &FailurePatterns) -> Vec<Recommendation> {
    let Some(dominant) = patterns.top_errors.first() else {
        return Vec::new();
    };

    let mut recommendations = Vec::new();
    match dominant.error_type.as_str() {
        "api_timeout" => recommendations.push(Recommendation {
            category: "timeouts".to_string(),
            priority: "high".to_string(),
            action: "increase_client_timeout".to_string(),
            description: format!(
                "{} entries failed on api_timeout; raise the per-call deadline or reduce batch sizes",
                dominant.count
            ),
        }),
        "quota_exceeded" => recommendations.push(Recommendation {
            category: "quota".to_string(),
            priority: "high".to_string(),
            action: "raise_quota_or_throttle".to_string(),
            description: format!(
                "{} entries failed on quota_exceeded; request a higher daily quota or lower the per-run plan",
                dominant.count
            ),
        }),
        "connection_error" => recommendations.push(Recommendation {
            category: "dependencies".to_string(),
            priority: "critical".to_string(),
            action: "investigate_dependency".to_string(),
            description: format!(
                "{} entries failed on connection_error; check upstream service health and DNS/network paths",
                dominant.count
            ),
        }),
        "validation_error" => recommendations.push(Recommendation {
            category: "inputs".to_string(),
            priority: "medium".to_string(),
            action: "harden_input_filters".to_string(),
            description: format!(
                "{} entries failed on validation_error; tighten input validation before dispatch",
                dominant.count
            ),
        }),
        other => recommendations.push(Recommendation {
            category: "failures".to_string(),
            priority: "medium".to_string(),
            action: "review_dominant_error".to_string(),
            description: format!(
                "dominant failure is {other} ({} entries); review recent examples for a common cause",
                dominant.count
            ),
        }),
    }

    // A wall of terminal auth failures deserves its own callout regardless
    // of what dominates numerically.
    let auth_failures = patterns
        .top_errors
        .iter()
        .find(|e| e.error_type == ErrorType::AuthorizationFailed.as_str());
    if let Some(auth) = auth_failures {
        if auth.error_type != dominant.error_type {
            recommendations.push(Recommendation {
                category: "credentials".to_string(),
                priority: "critical".to_string(),
                action: "rotate_or_fix_credentials".to_string(),
                description: format!(
                    "{} authorization failures present; verify API keys and service-account scopes",
                    auth.count
                ),
            });
        }
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopiloot_types::{FailureContext, JobType, RecoveryPriority, Severity};

    fn entry(error_type: ErrorType, job_type: JobType, minutes_ago: i64, retry_count: u32) -> DlqEntry {
        let created = Utc::now() - Duration::minutes(minutes_ago);
        DlqEntry {
            dlq_id: format!("{}_{}_{}", job_type.as_str(), minutes_ago, retry_count),
            original_job_id: "job".to_string(),
            job_type,
            failure_context: FailureContext {
                error_type,
                error_message: format!("{error_type} while processing"),
                retry_count,
                last_attempt_at: None,
                original_inputs: None,
            },
            recovery_hints: None,
            dlq_created_at: created,
            dlq_created_by: "orchestrator".to_string(),
            severity: Severity::Low,
            recovery_priority: RecoveryPriority::Low,
            processing_attempts: retry_count + 1,
            video_id: None,
            video_ids: Vec::new(),
            target_channels: Vec::new(),
            estimated_quota_impact: None,
            estimated_cost_impact: None,
            target_platforms: Vec::new(),
        }
    }

    #[test]
    fn empty_windows_produce_a_quiet_report() {
        let report = analyze_dlq_trends(&[], &[], TrendOptions::default(), Utc::now());
        assert_eq!(report.trend_analysis.total_entries, 0);
        assert!(report.alerts.is_empty());
        assert!(report.recommendations.is_empty());
        assert_eq!(report.trend_analysis.failure_rate_trend, "stable");
    }

    #[test]
    fn spike_over_baseline_raises_an_alert() {
        let current: Vec<DlqEntry> = (0..12)
            .map(|i| entry(ErrorType::ApiTimeout, JobType::SingleVideo, i, 3))
            .collect();
        let previous: Vec<DlqEntry> = (0..2)
            .map(|i| entry(ErrorType::ApiTimeout, JobType::SingleVideo, 60 * 30 + i, 3))
            .collect();

        let report = analyze_dlq_trends(&current, &previous, TrendOptions::default(), Utc::now());
        assert_eq!(report.trend_analysis.failure_rate_trend, "increasing");
        assert!(!report.alerts.is_empty());
        assert_eq!(report.alerts[0].severity, "critical"); // 6x over a 2x threshold
    }

    #[test]
    fn top_errors_carry_percentage_and_examples() {
        let mut current = Vec::new();
        for i in 0..6 {
            current.push(entry(ErrorType::ApiTimeout, JobType::SingleVideo, i, 3));
        }
        for i in 0..2 {
            current.push(entry(ErrorType::QuotaExceeded, JobType::ChannelScrape, i, 0));
        }

        let report = analyze_dlq_trends(&current, &[], TrendOptions::default(), Utc::now());
        let top = &report.failure_patterns.top_errors[0];
        assert_eq!(top.error_type, "api_timeout");
        assert_eq!(top.count, 6);
        assert!((top.percentage - 75.0).abs() < 1e-9);
        assert!(!top.recent_examples.is_empty());
        assert!(top.recent_examples.len() <= 3);

        assert_eq!(report.failure_patterns.affected_agents["transcriber"], 6);
        assert_eq!(report.failure_patterns.error_distribution.by_job_type["channel_scrape"], 2);
        assert_eq!(report.failure_patterns.retry_analysis[&3], 6);
    }

    #[test]
    fn recommendations_follow_the_dominant_error() {
        let current: Vec<DlqEntry> = (0..4)
            .map(|i| entry(ErrorType::QuotaExceeded, JobType::ChannelScrape, i, 0))
            .collect();
        let report = analyze_dlq_trends(&current, &[], TrendOptions::default(), Utc::now());
        assert_eq!(report.recommendations[0].action, "raise_quota_or_throttle");
        assert!(["low", "medium", "high", "critical"]
            .contains(&report.recommendations[0].priority.as_str()));
    }

    #[test]
    fn recommendations_can_be_disabled() {
        let current = vec![entry(ErrorType::ApiTimeout, JobType::SingleVideo, 1, 3)];
        let options = TrendOptions {
            include_recommendations: false,
            ..TrendOptions::default()
        };
        let report = analyze_dlq_trends(&current, &[], options, Utc::now());
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn window_bounds_are_clamped() {
        let options = TrendOptions {
            window_hours: 10_000,
            spike_threshold: 50.0,
            include_recommendations: true,
        }
        .clamped();
        assert_eq!(options.window_hours, 168);
        assert!((options.spike_threshold - 10.0).abs() < 1e-9);
    }
}
