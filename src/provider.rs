use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

use crate::conversation::Turn;

/// Sampling settings forwarded to the model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

/// Text-in, text-out model boundary.
///
/// Implementations stream fragments through `on_chunk` as they arrive and
/// return the complete turn text once the stream ends.
#[async_trait]
pub trait ModelProvider: Debug + Send + Sync {
    async fn stream_chat(
        &self,
        turns: &[Turn],
        options: &GenerationOptions,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<String>;

    /// Names of the models the backend can serve
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Get the model name being used
    fn model_name(&self) -> &str;

    /// Get provider-specific information (e.g., "Ollama")
    fn provider_name(&self) -> &str;
}

/// Configuration for creating model providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub model: String,
    pub host: String,
    pub request_timeout: Duration,
}

/// Factory for creating model providers
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider based on the model string
    /// Model format: "`provider::model`" or just "model" (defaults to Ollama)
    pub fn create_provider(config: ProviderConfig) -> Result<Box<dyn ModelProvider>> {
        let (provider_name, model_name) = match config.model.split_once("::") {
            Some((provider, model)) => (provider, model),
            None => ("ollama", config.model.as_str()),
        };

        match provider_name.to_lowercase().as_str() {
            "ollama" => {
                let client = crate::ollama::OllamaClient::new(
                    model_name.to_string(),
                    &config.host,
                    config.request_timeout,
                )?;
                Ok(Box::new(client))
            }
            _ => Err(anyhow::anyhow!(
                "Unsupported provider: {provider_name}. Supported providers: ollama"
            )),
        }
    }
}
