use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

use autopiloot_providers::NotificationSink;

use crate::config::SlackConfig;

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

pub struct SlackSink {
    config: SlackConfig,
    client: Client,
    post_url: String,
}

impl SlackSink {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            post_url: POST_MESSAGE_URL.to_string(),
        }
    }

    pub fn with_post_url(mut self, post_url: impl Into<String>) -> Self {
        self.post_url = post_url.into();
        self
    }

    pub fn default_channel(&self) -> &str {
        &self.config.channel
    }
}

#[async_trait]
impl NotificationSink for SlackSink {
    async fn post(&self, channel: &str, blocks: Vec<Value>) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.post_url)
            .bearer_auth(&self.config.bot_token)
            .json(&json!({
                "channel": channel,
                "blocks": blocks,
            }))
            .send()
            .await?;

        let body: Value = response.json().await?;
        if body["ok"].as_bool().unwrap_or(false) {
            info!(channel, "posted operational report to Slack");
            Ok(())
        } else {
            let error = body["error"].as_str().unwrap_or("unknown").to_string();
            warn!(channel, %error, "Slack rejected the message");
            anyhow::bail!("slack chat.postMessage failed: {error}")
        }
    }
}

/// A sink that drops everything, used when Slack is not configured.
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn post(&self, _channel: &str, _blocks: Vec<Value>) -> anyhow::Result<()> {
        Ok(())
    }
}
