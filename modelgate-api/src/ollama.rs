//! Ollama model provider
//!
//! Lists the models an Ollama server has pulled via `GET /api/tags`.

use std::time::Duration;

use async_trait::async_trait;
use modelgate_shared::provider::{ModelProvider, ProviderError, ProviderModel};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

pub const PROVIDER_NAME: &str = "ollama";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Parses an `/api/tags` body, skipping entries without a name.
pub fn parse_tags(body: &[u8]) -> Result<Vec<ProviderModel>, ProviderError> {
    let tags: TagsResponse =
        serde_json::from_slice(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    Ok(tags
        .models
        .into_iter()
        .map(|entry| entry.name.trim().to_string())
        .filter(|name| !name.is_empty())
        .map(ProviderModel::new)
        .collect())
}

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn list_models(&self) -> Result<Vec<ProviderModel>, ProviderError> {
        let url = self.tags_url();
        debug!(%url, "Listing Ollama models");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Request(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        parse_tags(&body)
    }
}
