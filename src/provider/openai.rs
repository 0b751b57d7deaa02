//! OpenAI-compatible provider

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

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";

const OPENAI_TEMPERATURE: f32 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: OPENAI_DEFAULT_BASE_URL.to_string(),
            organization: None,
            project: None,
            model: OPENAI_DEFAULT_MODEL.to_string(),
        }
    }
}

/// Remote provider for OpenAI and API-compatible endpoints.
pub struct OpenAiProvider {
    client: ChatCompletionClient,
    assembler: PromptAssembler,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let base_url = if config.base_url.is_empty() {
            OPENAI_DEFAULT_BASE_URL
        } else {
            config.base_url.as_str()
        };
        let mut client = ChatCompletionClient::new(base_url, &config.api_key, &config.model)
            .with_temperature(OPENAI_TEMPERATURE);
        if let Some(organization) = config.organization.filter(|s| !s.is_empty()) {
            client = client.with_header("OpenAI-Organization", organization);
        }
        if let Some(project) = config.project.filter(|s| !s.is_empty()) {
            client = client.with_header("OpenAI-Project", project);
        }

        Self {
            client,
            assembler: PromptAssembler::new(recognizer),
        }
    }
}

#[async_trait]
impl TextProvider for OpenAiProvider {
    async fn process_text(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        // The chat API takes no image attachments here; OCR text rides in the
        // user message instead. Videos are ignored.
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
        let config = OpenAiConfig::default();
        assert_eq!(config.base_url, OPENAI_DEFAULT_BASE_URL);
        assert_eq!(config.model, OPENAI_DEFAULT_MODEL);
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_config_toml_with_partial_fields() {
        let config: OpenAiConfig = toml::from_str(
            r#"
            api_key = "sk-test"
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.base_url, OPENAI_DEFAULT_BASE_URL);
    }
}
