//! Model providers the registry can synchronise from.
//!
//! A provider only reports which models it serves; the registry decides
//! what to store. Implementations live with the binary that talks to the
//! backend (for example the Ollama client in the API crate).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::models::model::CreateModel;

/// Context length assumed when a provider does not report one
pub const DEFAULT_CONTEXT_LENGTH: i32 = 4096;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("request to provider failed: {0}")]
    Request(String),

    #[error("provider returned an unexpected response: {0}")]
    InvalidResponse(String),
}

/// One model as reported by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderModel {
    /// The provider's identifier, e.g. "llama3:8b"
    pub id: String,

    pub context_length: Option<i32>,
}

impl ProviderModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context_length: None,
        }
    }
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable provider name stored in `models.provider`
    fn name(&self) -> &str;

    async fn list_models(&self) -> Result<Vec<ProviderModel>, ProviderError>;
}

/// Registration defaults for a model discovered through `provider`.
pub fn registration_for(provider: &str, model: &ProviderModel) -> CreateModel {
    CreateModel {
        name: capitalize(&model.id),
        provider: provider.to_string(),
        provider_model_id: model.id.clone(),
        description: Some(format!("{} model: {}", capitalize(provider), model.id)),
        context_length: model
            .context_length
            .filter(|len| *len > 0)
            .unwrap_or(DEFAULT_CONTEXT_LENGTH),
        capabilities: vec!["code_completion".to_string(), "chat".to_string()],
        parameters: Some(json!({
            "temperature": 0.7,
            "top_p": 0.9,
            "max_tokens": 1024,
        })),
        is_active: true,
        is_default: false,
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
