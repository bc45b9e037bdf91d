// AssemblyAI transcription client: submit, poll, settle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    with_deadline, ProviderError, TranscriptionResult, TranscriptionService,
    TRANSCRIPTION_POLL_TIMEOUT,
};

const API_BASE: &str = "https://api.assemblyai.com/v2";
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Flat per-video estimate used when the service reports no billing data.
const DEFAULT_COST_USD: f64 = 0.5;

pub struct AssemblyAiClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl AssemblyAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post_json(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .header("authorization", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        check_status(response).await
    }

    async fn get_json(&self, path: &str) -> anyhow::Result<Value> {
        let response = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .header("authorization", &self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;
        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> anyhow::Result<Value> {
    match response.status().as_u16() {
        200 | 201 => Ok(response.json().await?),
        401 | 403 => Err(ProviderError::Authorization {
            service: "assemblyai".to_string(),
        }
        .into()),
        429 => Err(ProviderError::RateLimited {
            service: "assemblyai".to_string(),
        }
        .into()),
        status => Err(ProviderError::Server {
            service: "assemblyai".to_string(),
            status,
        }
        .into()),
    }
}

#[async_trait]
impl TranscriptionService for AssemblyAiClient {
    async fn transcribe(&self, video_url: &str) -> anyhow::Result<TranscriptionResult> {
        with_deadline(TRANSCRIPTION_POLL_TIMEOUT, async {
            let submitted = self
                .post_json("transcript", json!({ "audio_url": video_url }))
                .await?;
            let transcript_id = submitted["id"].as_str().ok_or_else(|| {
                ProviderError::InvalidResponse {
                    service: "assemblyai".to_string(),
                    detail: "submit response missing id".to_string(),
                }
            })?;
            let transcript_id = transcript_id.to_string();
            debug!(%transcript_id, "transcription submitted");

            loop {
                let polled = self.get_json(&format!("transcript/{transcript_id}")).await?;
                match polled["status"].as_str().unwrap_or_default() {
                    "completed" => {
                        let text = polled["text"].as_str().unwrap_or_default();
                        let audio_duration = polled["audio_duration"].as_f64().unwrap_or(0.0);
                        let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
                        // Billed per audio hour; fall back to the flat
                        // per-video estimate when duration is unreported.
                        let cost_usd = if audio_duration > 0.0 {
                            audio_duration / 3600.0 * 0.90
                        } else {
                            DEFAULT_COST_USD
                        };
                        return Ok(TranscriptionResult {
                            drive_id_txt: format!("aai_{transcript_id}_txt"),
                            drive_id_json: format!("aai_{transcript_id}_json"),
                            digest,
                            cost_usd,
                        });
                    }
                    "error" => {
                        let detail = polled["error"].as_str().unwrap_or("unknown").to_string();
                        return Err(ProviderError::InvalidResponse {
                            service: "assemblyai".to_string(),
                            detail,
                        }
                        .into());
                    }
                    _ => tokio::time::sleep(POLL_INTERVAL).await,
                }
            }
        })
        .await
    }
}
