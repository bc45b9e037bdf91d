// Google Sheets backfill source: reads link cells from a spreadsheet
// range. Only direct YouTube links are honored here; page scraping is a
// separate concern behind this boundary.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::{with_deadline, ProviderError, SheetSource, DATA_API_TIMEOUT};

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

pub struct GoogleSheets {
    api_key: String,
    client: Client,
    base_url: String,
}

impl GoogleSheets {
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
}

#[async_trait]
impl SheetSource for GoogleSheets {
    async fn read_video_urls(&self, sheet_id: &str, range: &str) -> anyhow::Result<Vec<String>> {
        with_deadline(DATA_API_TIMEOUT, async {
            let response = self
                .client
                .get(format!("{}/{sheet_id}/values/{range}", self.base_url))
                .query(&[("key", self.api_key.as_str())])
                .send()
                .await
                .map_err(|e| ProviderError::Connection(e.to_string()))?;

            let body: Value = match response.status().as_u16() {
                200 => response.json().await?,
                401 | 403 => {
                    return Err(ProviderError::Authorization {
                        service: "sheets".to_string(),
                    }
                    .into())
                }
                429 => {
                    return Err(ProviderError::RateLimited {
                        service: "sheets".to_string(),
                    }
                    .into())
                }
                status => {
                    return Err(ProviderError::Server {
                        service: "sheets".to_string(),
                        status,
                    }
                    .into())
                }
            };

            let urls = body["values"]
                .as_array()
                .map(|rows| {
                    rows.iter()
                        .filter_map(|row| row.as_array())
                        .filter_map(|row| row.first())
                        .filter_map(|cell| cell.as_str())
                        .map(str::trim)
                        .filter(|cell| !cell.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Ok(urls)
        })
        .await
    }
}
