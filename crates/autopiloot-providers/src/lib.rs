//! Contracts for every external collaborator the core consumes, plus the
//! HTTP implementations. The orchestration core only depends on the traits;
//! swapping a hosted service for a test double is a one-line change.

pub mod assemblyai;
pub mod local;
pub mod openai;
pub mod sheets;
pub mod youtube;
pub mod zep;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use autopiloot_types::{ErrorType, TokenUsage};

/// Per-call deadline for ordinary data APIs.
pub const DATA_API_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-call deadline for transcription submit-and-poll cycles.
pub const TRANSCRIPTION_POLL_TIMEOUT: Duration = Duration::from_secs(300);

/// Typed failure raised by provider implementations. Dispatchers downcast
/// this out of `anyhow` to classify errors for the policy engine.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request deadline of {0:?} expired")]
    Timeout(Duration),

    #[error("rate limited by {service}")]
    RateLimited { service: String },

    #[error("authorization failed for {service}")]
    Authorization { service: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("{service} returned status {status}")]
    Server { service: String, status: u16 },

    #[error("unexpected response from {service}: {detail}")]
    InvalidResponse { service: String, detail: String },
}

impl ProviderError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            ProviderError::Timeout(_) => ErrorType::ApiTimeout,
            ProviderError::RateLimited { .. } => ErrorType::RateLimit,
            ProviderError::Authorization { .. } => ErrorType::AuthorizationFailed,
            ProviderError::Connection(_) => ErrorType::ConnectionError,
            ProviderError::Server { .. } => ErrorType::ServerError,
            ProviderError::InvalidResponse { .. } => ErrorType::DependencyFailure,
        }
    }
}

/// Map any collaborator failure into the error taxonomy. Unclassified
/// failures count as dependency failures (transient).
pub fn classify_error(err: &anyhow::Error) -> ErrorType {
    if let Some(provider_err) = err.downcast_ref::<ProviderError>() {
        return provider_err.error_type();
    }
    if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>() {
        if reqwest_err.is_timeout() {
            return ErrorType::ApiTimeout;
        }
        if reqwest_err.is_connect() {
            return ErrorType::ConnectionError;
        }
    }
    ErrorType::DependencyFailure
}

/// Run `future` under a deadline; expiry surfaces as an `api_timeout`.
pub async fn with_deadline<T, F>(limit: Duration, future: F) -> anyhow::Result<T>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout(limit).into()),
    }
}

/// One upload as reported by the channel source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadItem {
    pub video_id: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub duration_sec: u32,
}

#[async_trait]
pub trait ChannelSource: Send + Sync {
    async fn resolve_handle(&self, handle: &str) -> anyhow::Result<String>;

    /// Uploads in `(since, until]`, newest last, at most `limit`.
    async fn list_uploads(
        &self,
        channel_id: &str,
        since: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<UploadItem>>;

    /// Metadata for one known video id (sheet backfill ingestion).
    async fn lookup_video(&self, video_id: &str) -> anyhow::Result<Option<UploadItem>>;
}

/// Link rows from a backfill spreadsheet. The page-scraping heuristics that
/// turn arbitrary pages into video links live behind this boundary.
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn read_video_urls(&self, sheet_id: &str, range: &str) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub drive_id_txt: String,
    pub drive_id_json: String,
    pub digest: String,
    pub cost_usd: f64,
}

#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(&self, video_url: &str) -> anyhow::Result<TranscriptionResult>;
}

/// Outcome of a summary generation call. `is_business_content = false`
/// triggers the non-business rejection path; it is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryOutcome {
    pub bullets: Vec<String>,
    pub key_concepts: Vec<String>,
    pub is_business_content: bool,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub token_usage: TokenUsage,
    pub prompt_id: String,
    pub prompt_version: String,
    pub model: String,
}

#[async_trait]
pub trait SummarizationService: Send + Sync {
    async fn summarize(&self, transcript_text: &str, title: &str) -> anyhow::Result<SummaryOutcome>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDoc {
    pub doc_id: String,
    pub collection: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        doc_id: &str,
        content: &str,
        metadata: Value,
        labels: &[String],
    ) -> anyhow::Result<IndexedDoc>;
}

/// Operational report sink (Slack in production).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn post(&self, channel: &str, blocks: Vec<Value>) -> anyhow::Result<()>;
}

/// Opaque artifact blobs (transcript text, summary markdown) addressed by
/// external id.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn fetch_text(&self, artifact_id: &str) -> anyhow::Result<String>;

    /// Store content under `name`; returns the artifact id.
    async fn store_text(&self, name: &str, content: &str) -> anyhow::Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_onto_the_taxonomy() {
        assert_eq!(
            ProviderError::Timeout(DATA_API_TIMEOUT).error_type(),
            ErrorType::ApiTimeout
        );
        assert_eq!(
            ProviderError::Authorization {
                service: "youtube".to_string()
            }
            .error_type(),
            ErrorType::AuthorizationFailed
        );
        assert_eq!(
            ProviderError::Server {
                service: "assemblyai".to_string(),
                status: 503
            }
            .error_type(),
            ErrorType::ServerError
        );
    }

    #[test]
    fn classify_falls_back_to_dependency_failure() {
        let err = anyhow::anyhow!("something odd");
        assert_eq!(classify_error(&err), ErrorType::DependencyFailure);

        let wrapped: anyhow::Error = ProviderError::RateLimited {
            service: "youtube".to_string(),
        }
        .into();
        assert_eq!(classify_error(&wrapped), ErrorType::RateLimit);
    }

    #[tokio::test]
    async fn deadline_expiry_is_an_api_timeout() {
        let result: anyhow::Result<()> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert_eq!(classify_error(&err), ErrorType::ApiTimeout);
    }
}
