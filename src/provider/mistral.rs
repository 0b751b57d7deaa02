//! Mistral provider

use crate::error::ProviderError;
use crate::inference::prompt::PromptAssembler;
use crate::inference::session::GenerationRequest;
use crate::ocr::TextRecognizer;
use crate::provider::TextProvider;
use crate::provider::remote::ChatCompletionClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MISTRAL_DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";
pub const MISTRAL_DEFAULT_MODEL: &str = "mistral-small-latest";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MistralConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: MISTRAL_DEFAULT_BASE_URL.to_string(),
            model: MISTRAL_DEFAULT_MODEL.to_string(),
        }
    }
}

/// Remote provider for the Mistral chat API.
pub struct MistralProvider {
    client: ChatCompletionClient,
    assembler: PromptAssembler,
}

impl MistralProvider {
    pub fn new(config: MistralConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let base_url = if config.base_url.is_empty() {
            MISTRAL_DEFAULT_BASE_URL
        } else {
            config.base_url.as_str()
        };
        Self {
            client: ChatCompletionClient::new(base_url, &config.api_key, &config.model),
            assembler: PromptAssembler::new(recognizer),
        }
    }
}

#[async_trait]
impl TextProvider for MistralProvider {
    async fn process_text(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let user_prompt = self
            .assembler
            .merge_ocr_text(&request.user_prompt, &request.images)
            .await;

        // The Mistral endpoint is only consumed non-streaming; the system
        // message is included only when the caller supplied one.
        self.client
            .complete(request.system_prompt.as_deref(), &user_prompt, false)
            .await
    }

    fn cancel(&self) {
        self.client.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MistralConfig::default();
        assert_eq!(config.base_url, MISTRAL_DEFAULT_BASE_URL);
        assert_eq!(config.model, MISTRAL_DEFAULT_MODEL);
    }
}
