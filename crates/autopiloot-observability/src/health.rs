// Operational health scoring shared by run reports and the daily summary.

use autopiloot_types::AlertLevel;

/// Quota fit outside the sweet spot but under 90% utilization.
const PARTIAL_QUOTA_FIT: f64 = 0.67;

/// Health score in `[0, 100]`.
///
/// Weights: 70 points for the success rate, 15 for a low DLQ rate, 15 for
/// quota fit. Quota fit is 1.0 in the 70–80% utilization band (fully
/// provisioned but not throttling), 0.67 below 90%, and 0 beyond.
pub fn health_score(success_rate: f64, dlq_rate: f64, quota_utilizations: &[f64]) -> f64 {
    let mut score = success_rate.clamp(0.0, 1.0) * 70.0;
    score += (1.0 - dlq_rate.clamp(0.0, 1.0)) * 15.0;

    if !quota_utilizations.is_empty() {
        let mean = quota_utilizations.iter().sum::<f64>() / quota_utilizations.len() as f64;
        if (0.7..=0.8).contains(&mean) {
            score += 15.0;
        } else if mean < 0.9 {
            score += 15.0 * PARTIAL_QUOTA_FIT;
        }
    }

    score.clamp(0.0, 100.0)
}

pub fn health_status(score: f64) -> &'static str {
    if score >= 90.0 {
        "excellent"
    } else if score >= 80.0 {
        "good"
    } else if score >= 60.0 {
        "fair"
    } else if score >= 40.0 {
        "poor"
    } else {
        "critical"
    }
}

/// Status icon for report headers, derived from alert level first and
/// success rate second.
pub fn status_icon(alert_level: AlertLevel, success_rate: f64) -> &'static str {
    match alert_level {
        AlertLevel::Critical => "🚨",
        AlertLevel::Error => "❌",
        AlertLevel::Warning => "⚠️",
        AlertLevel::Info => {
            if success_rate >= 0.95 {
                "✅"
            } else if success_rate >= 0.8 {
                "🟡"
            } else {
                "🔴"
            }
        }
    }
}
