// OpenAI chat-completions summarizer with structured JSON output.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use autopiloot_core::config::ResolvedLlmTask;
use autopiloot_types::TokenUsage;

use crate::{
    with_deadline, ProviderError, SummarizationService, SummaryOutcome, DATA_API_TIMEOUT,
};

const API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiSummarizer {
    api_key: String,
    client: Client,
    base_url: String,
    task: ResolvedLlmTask,
}

impl OpenAiSummarizer {
    pub fn new(api_key: impl Into<String>, task: ResolvedLlmTask) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: API_BASE.to_string(),
            task,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SummarizationService for OpenAiSummarizer {
    async fn summarize(&self, transcript_text: &str, title: &str) -> anyhow::Result<SummaryOutcome> {
        with_deadline(DATA_API_TIMEOUT, async {
            let body = json!({
                "model": self.task.model,
                "temperature": self.task.temperature,
                "max_tokens": self.task.max_output_tokens,
                "response_format": { "type": "json_object" },
                "messages": [
                    {
                        "role": "system",
                        "content": "You are an expert business coach. Decide whether the \
                            transcript is business content; if so, extract actionable \
                            insights and key concepts. Respond with a JSON object with \
                            keys is_business_content (bool), content_type (string), \
                            reason (string), actionable_insights (string[]), \
                            key_concepts (string[])."
                    },
                    {
                        "role": "user",
                        "content": format!("Title: {title}\n\nTranscript:\n{transcript_text}")
                    }
                ],
            });

            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| ProviderError::Connection(e.to_string()))?;

            let value: Value = match response.status().as_u16() {
                200 => response.json().await?,
                401 | 403 => {
                    return Err(ProviderError::Authorization {
                        service: "openai".to_string(),
                    }
                    .into())
                }
                429 => {
                    return Err(ProviderError::RateLimited {
                        service: "openai".to_string(),
                    }
                    .into())
                }
                status => {
                    return Err(ProviderError::Server {
                        service: "openai".to_string(),
                        status,
                    }
                    .into())
                }
            };

            let content = value["choices"][0]["message"]["content"]
                .as_str()
                .ok_or_else(|| ProviderError::InvalidResponse {
                    service: "openai".to_string(),
                    detail: "completion missing content".to_string(),
                })?;
            let parsed: Value =
                serde_json::from_str(content).map_err(|e| ProviderError::InvalidResponse {
                    service: "openai".to_string(),
                    detail: format!("non-JSON completion: {e}"),
                })?;

            let usage = TokenUsage::new(
                value["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
                value["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            );

            Ok(build_outcome(&parsed, usage, &self.task))
        })
        .await
    }
}

fn build_outcome(parsed: &Value, token_usage: TokenUsage, task: &ResolvedLlmTask) -> SummaryOutcome {
    let strings = |key: &str| -> Vec<String> {
        parsed[key]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    SummaryOutcome {
        bullets: strings("actionable_insights"),
        key_concepts: strings("key_concepts"),
        is_business_content: parsed["is_business_content"].as_bool().unwrap_or(false),
        content_type: parsed["content_type"].as_str().unwrap_or("Unknown").to_string(),
        reason: parsed["reason"].as_str().map(str::to_string),
        token_usage,
        prompt_id: task
            .prompt_id
            .clone()
            .unwrap_or_else(|| "comprehensive_coach_v2".to_string()),
        prompt_version: task.prompt_version.clone().unwrap_or_else(|| "v2".to_string()),
        model: task.model.clone(),
    }
}
