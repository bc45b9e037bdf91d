// Settings resolver
// Loads `settings.yaml` from a fixed search path into a typed tree, cached
// for the process lifetime. The loose dot-path lookup exists only for debug
// and telemetry surfaces; runtime code reads the typed fields.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    MissingConfiguration(String),

    #[error("settings.yaml not found; searched {0:?}")]
    SettingsNotFound(Vec<PathBuf>),

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Channel handles discovered on every scheduled run.
    pub handles: Vec<String>,
    pub daily_limit_per_channel: u32,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            handles: vec!["@AlexHormozi".to_string()],
            daily_limit_per_channel: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub youtube_daily_limit: u64,
    pub assemblyai_daily_limit: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            youtube_daily_limit: 10_000,
            assemblyai_daily_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_sec: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_sec: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    pub quotas: QuotaConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetsConfig {
    pub transcription_daily_usd: f64,
}

impl Default for BudgetsConfig {
    fn default() -> Self {
        Self {
            transcription_daily_usd: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Videos longer than this are skipped for transcription.
    pub max_video_duration_sec: u32,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            max_video_duration_sec: 4200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmDefaults {
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u64,
}

impl Default for LlmDefaults {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_output_tokens: 1500,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmTaskConfig {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u64>,
    pub prompt_id: Option<String>,
    pub prompt_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub default: LlmDefaults,
    pub tasks: BTreeMap<String, LlmTaskConfig>,
}

impl LlmConfig {
    /// Task settings with the defaults filled in.
    pub fn resolve_task(&self, task: &str) -> ResolvedLlmTask {
        let overrides = self.tasks.get(task);
        ResolvedLlmTask {
            model: overrides
                .and_then(|t| t.model.clone())
                .unwrap_or_else(|| self.default.model.clone()),
            temperature: overrides
                .and_then(|t| t.temperature)
                .unwrap_or(self.default.temperature),
            max_output_tokens: overrides
                .and_then(|t| t.max_output_tokens)
                .unwrap_or(self.default.max_output_tokens),
            prompt_id: overrides.and_then(|t| t.prompt_id.clone()),
            prompt_version: overrides.and_then(|t| t.prompt_version.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedLlmTask {
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u64,
    pub prompt_id: Option<String>,
    pub prompt_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackNotifications {
    pub channel: String,
}

impl Default for SlackNotifications {
    fn default() -> Self {
        Self {
            channel: "ops-autopiloot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub slack: SlackNotifications,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenSearchConfig {
    pub endpoint: Option<String>,
    pub index: Option<String>,
    pub top_k: Option<u32>,
    pub hybrid_weight: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub opensearch: OpenSearchConfig,
}

/// The whole `settings.yaml` document. Unknown keys are ignored; every
/// section has workable defaults so a partial file still loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub reliability: ReliabilityConfig,
    pub budgets: BudgetsConfig,
    pub idempotency: IdempotencyConfig,
    pub llm: LlmConfig,
    pub notifications: NotificationsConfig,
    pub rag: RagConfig,
}

impl AppConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// First existing file on the conventional search path.
    pub fn load() -> Result<Self, ConfigError> {
        let searched: Vec<PathBuf> = settings_search_path();
        for candidate in &searched {
            if candidate.exists() {
                return Self::from_file(candidate);
            }
        }
        Err(ConfigError::SettingsNotFound(searched))
    }

    /// Process-lifetime cached load; a restart picks up edits.
    pub fn load_cached() -> Result<&'static Self, ConfigError> {
        static CACHE: OnceCell<AppConfig> = OnceCell::new();
        CACHE.get_or_try_init(Self::load)
    }

    /// Loose dot-path lookup for debug/telemetry surfaces, e.g.
    /// `value_at("reliability.retry.max_attempts")`.
    pub fn value_at(&self, dot_path: &str) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        let mut cursor = &root;
        for key in dot_path.split('.') {
            cursor = cursor.get(key)?;
        }
        Some(cursor.clone())
    }

    /// Required string read; empty counts as missing.
    pub fn require_str(&self, dot_path: &str) -> Result<String, ConfigError> {
        match self.value_at(dot_path) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
            _ => Err(ConfigError::MissingConfiguration(dot_path.to_string())),
        }
    }
}

fn settings_search_path() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(explicit) = std::env::var("AUTOPILOOT_SETTINGS") {
        if !explicit.trim().is_empty() {
            candidates.push(PathBuf::from(explicit));
        }
    }
    candidates.extend([
        PathBuf::from("autopiloot/config/settings.yaml"),
        PathBuf::from("config/settings.yaml"),
        PathBuf::from("settings.yaml"),
    ]);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
scraper:
  handles: ["@AlexHormozi", "@leila"]
  daily_limit_per_channel: 5
reliability:
  quotas:
    youtube_daily_limit: 8000
  retry:
    max_attempts: 4
budgets:
  transcription_daily_usd: 3.5
llm:
  default:
    model: gpt-4o
    temperature: 0.3
  tasks:
    summarizer_generate_short:
      prompt_id: coach_v2
      prompt_version: v2
      max_output_tokens: 900
notifications:
  slack:
    channel: ops-autopiloot
"#;

    #[test]
    fn parses_a_partial_document_with_defaults() {
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.scraper.handles.len(), 2);
        assert_eq!(config.scraper.daily_limit_per_channel, 5);
        assert_eq!(config.reliability.quotas.youtube_daily_limit, 8000);
        // Unspecified keys fall back to defaults.
        assert_eq!(config.reliability.quotas.assemblyai_daily_limit, 100);
        assert_eq!(config.reliability.retry.base_delay_sec, 60);
        assert_eq!(config.idempotency.max_video_duration_sec, 4200);
        assert!((config.budgets.transcription_daily_usd - 3.5).abs() < 1e-9);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = AppConfig::from_yaml_str("future_section:\n  key: value\n").unwrap();
        assert_eq!(config.scraper.daily_limit_per_channel, 10);
    }

    #[test]
    fn task_resolution_layers_over_defaults() {
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        let task = config.llm.resolve_task("summarizer_generate_short");
        assert_eq!(task.model, "gpt-4o");
        assert_eq!(task.max_output_tokens, 900);
        assert_eq!(task.prompt_id.as_deref(), Some("coach_v2"));

        let unknown = config.llm.resolve_task("nonexistent_task");
        assert_eq!(unknown.max_output_tokens, 1500);
        assert!(unknown.prompt_id.is_none());
    }

    #[test]
    fn dot_path_lookup_reaches_nested_values() {
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(
            config.value_at("scraper.daily_limit_per_channel"),
            Some(Value::from(5))
        );
        assert_eq!(
            config
                .value_at("llm.tasks.summarizer_generate_short.prompt_id")
                .unwrap(),
            Value::from("coach_v2")
        );
        assert_eq!(config.value_at("no.such.path"), None);
    }

    #[test]
    fn require_str_reports_the_missing_path() {
        let config = AppConfig::default();
        let err = config.require_str("llm.tasks.missing.prompt_id").unwrap_err();
        assert!(matches!(err, ConfigError::MissingConfiguration(path) if path == "llm.tasks.missing.prompt_id"));
    }

    #[test]
    fn missing_settings_file_lists_the_search_path() {
        let err = AppConfig::from_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
