pub mod daily_summary;
pub mod dlq_trends;
pub mod health;
pub mod llm_metrics;
pub mod logging;

pub use daily_summary::{build_daily_summary, DailySummaryInputs, DailySummaryReport, QuotaSnapshot};
pub use dlq_trends::{analyze_dlq_trends, DlqTrendReport, TrendOptions};
pub use health::{health_score, health_status, status_icon};
pub use llm_metrics::{collect_llm_metrics, LlmMetricsReport};
pub use logging::{
    emit_pipeline_event, init_process_logging, redact_text, PipelineEvent, ProcessKind, OBS_TARGET,
};
