// YouTube Data API v3 channel source.
// Handle resolution costs ~100 quota units (search.list), upload listing
// ~100 per page plus 1 for the detail batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use autopiloot_core::time::{parse_iso8601_duration, to_iso8601_z};

use crate::{with_deadline, ChannelSource, ProviderError, UploadItem, DATA_API_TIMEOUT};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Quota units consumed by one discovery pass over a channel.
pub const UNITS_PER_CHANNEL_SCAN: u64 = 100;

pub struct YouTubeDataApi {
    api_key: String,
    client: Client,
    base_url: String,
}

impl YouTubeDataApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: API_BASE.to_string(),
        }
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> anyhow::Result<Value> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .timeout(DATA_API_TIMEOUT)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        match response.status().as_u16() {
            200 => Ok(response.json().await?),
            401 | 403 => Err(ProviderError::Authorization {
                service: "youtube".to_string(),
            }
            .into()),
            429 => Err(ProviderError::RateLimited {
                service: "youtube".to_string(),
            }
            .into()),
            status => Err(ProviderError::Server {
                service: "youtube".to_string(),
                status,
            }
            .into()),
        }
    }
}

#[async_trait]
impl ChannelSource for YouTubeDataApi {
    async fn resolve_handle(&self, handle: &str) -> anyhow::Result<String> {
        let bare = handle.trim_start_matches('@').to_string();
        with_deadline(DATA_API_TIMEOUT, async {
            // Channel search first; the legacy username lookup is the
            // fallback for pre-handle channels.
            let found = self
                .get_json(
                    "search",
                    &[
                        ("part", "snippet".to_string()),
                        ("q", bare.clone()),
                        ("type", "channel".to_string()),
                        ("maxResults", "1".to_string()),
                    ],
                )
                .await?;
            if let Some(channel_id) = found["items"][0]["snippet"]["channelId"].as_str() {
                return Ok(channel_id.to_string());
            }

            let legacy = self
                .get_json(
                    "channels",
                    &[("part", "id".to_string()), ("forUsername", bare.clone())],
                )
                .await?;
            if let Some(channel_id) = legacy["items"][0]["id"].as_str() {
                return Ok(channel_id.to_string());
            }

            Err(ProviderError::InvalidResponse {
                service: "youtube".to_string(),
                detail: format!("no channel found for handle {handle}"),
            }
            .into())
        })
        .await
    }

    async fn list_uploads(
        &self,
        channel_id: &str,
        since: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<UploadItem>> {
        with_deadline(DATA_API_TIMEOUT, async {
            let mut uploads = Vec::new();
            let mut page_token: Option<String> = None;

            loop {
                let mut query = vec![
                    ("part", "id".to_string()),
                    ("channelId", channel_id.to_string()),
                    ("type", "video".to_string()),
                    ("order", "date".to_string()),
                    ("publishedBefore", to_iso8601_z(until)),
                    ("maxResults", limit.min(50).to_string()),
                ];
                if let Some(since) = since {
                    query.push(("publishedAfter", to_iso8601_z(since)));
                }
                if let Some(token) = &page_token {
                    query.push(("pageToken", token.clone()));
                }

                let page = self.get_json("search", &query).await?;
                let ids: Vec<String> = page["items"]
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| item["id"]["videoId"].as_str())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();

                if !ids.is_empty() {
                    let details = self
                        .get_json(
                            "videos",
                            &[
                                ("part", "snippet,contentDetails".to_string()),
                                ("id", ids.join(",")),
                            ],
                        )
                        .await?;
                    for video in details["items"].as_array().into_iter().flatten() {
                        if let Some(item) = parse_upload(video) {
                            uploads.push(item);
                        }
                    }
                }

                page_token = page["nextPageToken"].as_str().map(str::to_string);
                if page_token.is_none() || uploads.len() >= limit as usize {
                    break;
                }
            }

            uploads.truncate(limit as usize);
            debug!(channel_id, count = uploads.len(), "listed channel uploads");
            Ok(uploads)
        })
        .await
    }

    async fn lookup_video(&self, video_id: &str) -> anyhow::Result<Option<UploadItem>> {
        with_deadline(DATA_API_TIMEOUT, async {
            let details = self
                .get_json(
                    "videos",
                    &[
                        ("part", "snippet,contentDetails".to_string()),
                        ("id", video_id.to_string()),
                    ],
                )
                .await?;
            Ok(details["items"]
                .as_array()
                .and_then(|items| items.first())
                .and_then(parse_upload))
        })
        .await
    }
}

fn parse_upload(video: &Value) -> Option<UploadItem> {
    let video_id = video["id"].as_str()?;
    let title = video["snippet"]["title"].as_str().unwrap_or_default();
    let published_at = video["snippet"]["publishedAt"]
        .as_str()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())?
        .with_timezone(&Utc);
    let duration_sec = video["contentDetails"]["duration"]
        .as_str()
        .and_then(|raw| parse_iso8601_duration(raw).ok())
        .unwrap_or(0) as u32;

    Some(UploadItem {
        video_id: video_id.to_string(),
        title: title.to_string(),
        published_at,
        duration_sec,
    })
}
