//! Gemini provider
//!
//! Speaks to Gemini through its OpenAI-compatible chat-completion surface, so
//! it shares the common client wholesale.

use crate::catalog::DEFAULT_SYSTEM_PROMPT;
use crate::error::ProviderError;
use crate::inference::prompt::PromptAssembler;
use crate::inference::session::GenerationRequest;
use crate::ocr::TextRecognizer;
use crate::provider::TextProvider;
use crate::provider::remote::ChatCompletionClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const GEMINI_DEFAULT_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: GEMINI_DEFAULT_BASE_URL.to_string(),
            model: GEMINI_DEFAULT_MODEL.to_string(),
        }
    }
}

/// Remote provider for Gemini.
pub struct GeminiProvider {
    client: ChatCompletionClient,
    assembler: PromptAssembler,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let base_url = if config.base_url.is_empty() {
            GEMINI_DEFAULT_BASE_URL
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
impl TextProvider for GeminiProvider {
    async fn process_text(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let user_prompt = self
            .assembler
            .merge_ocr_text(&request.user_prompt, &request.images)
            .await;
        let system = request
            .system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);

        self.client
            .complete(Some(system), &user_prompt, request.streaming)
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
        let config = GeminiConfig::default();
        assert_eq!(config.base_url, GEMINI_DEFAULT_BASE_URL);
        assert_eq!(config.model, GEMINI_DEFAULT_MODEL);
    }
}
