//! Process logging and the structured pipeline-event stream.
//!
//! Two log surfaces: a console layer for operators, and a daily-rolling
//! JSONL file consumed by log shipping. Rolled files are pruned against the
//! retention window on startup, and every orchestration-visible action can
//! be emitted as a [`PipelineEvent`] so downstream tooling gets stable
//! field names (agent, job, video, decision) instead of free-form text.

use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target the JSONL consumers filter on.
pub const OBS_TARGET: &str = "autopiloot.obs";

/// Outbound HTTP internals drown the pipeline signal at `info`.
const DEFAULT_FILTER: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn";

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Engine,
    Worker,
}

impl ProcessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Engine => "engine",
            ProcessKind::Worker => "worker",
        }
    }

    /// Rolled-file prefix, e.g. `autopiloot-engine.2025-01-27.jsonl`.
    fn log_prefix(self) -> String {
        format!("autopiloot-{}", self.as_str())
    }
}

/// One orchestration-visible action, with the identifiers the pipeline
/// actually pivots on. Unset fields are omitted from the payload.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PipelineEvent<'a> {
    pub event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'a str>,
    /// Policy outcome that drove the action (`proceed`, `retry_in`,
    /// `skip`, `dlq`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<&'a str>,
}

impl<'a> PipelineEvent<'a> {
    pub fn new(event: &'a str) -> Self {
        Self {
            event,
            ..Self::default()
        }
    }
}

/// Emit a pipeline event on the observability target. The payload is one
/// JSON object per event so field names survive formatting layers.
pub fn emit_pipeline_event(level: Level, event: &PipelineEvent<'_>) {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| event.event.to_string());
    match level {
        Level::ERROR => {
            tracing::error!(target: OBS_TARGET, event = event.event, payload = %payload, "pipeline_event")
        }
        Level::WARN => {
            tracing::warn!(target: OBS_TARGET, event = event.event, payload = %payload, "pipeline_event")
        }
        _ => {
            tracing::info!(target: OBS_TARGET, event = event.event, payload = %payload, "pipeline_event")
        }
    }
}

/// Mask secrets or payload text before it reaches an external telemetry
/// sink; only length and a short fingerprint survive.
pub fn redact_text(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!("[redacted len={} fp={}]", trimmed.len(), short_hash(trimmed))
}

pub fn short_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub process: String,
    pub logs_dir: PathBuf,
    pub retention_days: u64,
    /// Rolled files removed by the retention pass.
    pub pruned_files: usize,
    pub initialized_at: DateTime<Utc>,
}

/// Install the console + rolling-JSONL subscriber for this process and
/// prune rolled files older than the retention window.
pub fn init_process_logging(
    process: ProcessKind,
    logs_dir: &Path,
    retention_days: u64,
) -> anyhow::Result<(WorkerGuard, LoggingInitInfo)> {
    fs::create_dir_all(logs_dir)?;
    let prefix = process.log_prefix();
    let pruned_files = prune_rotated_logs(logs_dir, &prefix, retention_days)?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(&prefix)
        .filename_suffix("jsonl")
        .build(logs_dir)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_writer(file_writer)
        .with_ansi(false)
        .with_current_span(false)
        .with_span_list(false);

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_ansi(std::io::stdout().is_terminal());

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // Repeated init (tests, embedded use) keeps the first subscriber.
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    let info = LoggingInitInfo {
        process: process.as_str().to_string(),
        logs_dir: logs_dir.to_path_buf(),
        retention_days,
        pruned_files,
        initialized_at: Utc::now(),
    };
    Ok((guard, info))
}

/// Delete rolled log files dated before the retention window. Returns how
/// many files were removed; unreadable entries are left alone.
fn prune_rotated_logs(
    logs_dir: &Path,
    prefix: &str,
    retention_days: u64,
) -> std::io::Result<usize> {
    let keep_after = Utc::now()
        .date_naive()
        .checked_sub_days(Days::new(retention_days))
        .unwrap_or(NaiveDate::MIN);

    let mut removed = 0;
    for entry in fs::read_dir(logs_dir)? {
        let Ok(entry) = entry else { continue };
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(file_date) = rotated_file_date(name, prefix) else {
            continue;
        };
        if file_date < keep_after && fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Parse the date out of a rolled file name of the shape
/// `{prefix}.YYYY-MM-DD.jsonl`; anything else is not ours to touch.
fn rotated_file_date(name: &str, prefix: &str) -> Option<NaiveDate> {
    let date_part = name
        .strip_prefix(prefix)?
        .strip_prefix('.')?
        .strip_suffix(".jsonl")?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
