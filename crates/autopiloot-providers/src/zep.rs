// Zep GraphRAG document upserts.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::{with_deadline, IndexedDoc, ProviderError, VectorIndex, DATA_API_TIMEOUT};

const API_BASE: &str = "https://api.getzep.com/api/v2";
const DEFAULT_COLLECTION: &str = "autopiloot_guidelines";

pub struct ZepIndex {
    api_key: String,
    client: Client,
    base_url: String,
    collection: String,
}

impl ZepIndex {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: API_BASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }
}

#[async_trait]
impl VectorIndex for ZepIndex {
    async fn upsert(
        &self,
        doc_id: &str,
        content: &str,
        metadata: Value,
        labels: &[String],
    ) -> anyhow::Result<IndexedDoc> {
        with_deadline(DATA_API_TIMEOUT, async {
            let response = self
                .client
                .post(format!(
                    "{}/collections/{}/documents",
                    self.base_url, self.collection
                ))
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "documents": [{
                        "document_id": doc_id,
                        "content": content,
                        "metadata": metadata,
                        "labels": labels,
                    }]
                }))
                .send()
                .await
                .map_err(|e| ProviderError::Connection(e.to_string()))?;

            match response.status().as_u16() {
                200 | 201 => Ok(IndexedDoc {
                    doc_id: doc_id.to_string(),
                    collection: self.collection.clone(),
                }),
                401 | 403 => Err(ProviderError::Authorization {
                    service: "zep".to_string(),
                }
                .into()),
                429 => Err(ProviderError::RateLimited {
                    service: "zep".to_string(),
                }
                .into()),
                status => Err(ProviderError::Server {
                    service: "zep".to_string(),
                    status,
                }
                .into()),
            }
        })
        .await
    }
}
