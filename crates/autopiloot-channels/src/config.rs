//! Configuration for notification adapters.
//!
//! Tokens come from the environment; the target channel comes from
//! `settings.yaml`. `SlackConfig::from_env` returns `Err` only when the bot
//! token is absent, which disables delivery rather than the whole system.

use anyhow::bail;

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    /// Channel name or ID operational reports are posted to.
    pub channel: String,
}

impl SlackConfig {
    pub fn from_env(default_channel: &str) -> anyhow::Result<Self> {
        let bot_token = std::env::var("SLACK_BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            bail!("SLACK_BOT_TOKEN is not set — Slack delivery disabled");
        }

        let channel = std::env::var("SLACK_CHANNEL")
            .ok()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| default_channel.to_string());

        Ok(Self {
            bot_token: bot_token.trim().to_string(),
            channel,
        })
    }
}
