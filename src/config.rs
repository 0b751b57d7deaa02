//! Configuration structures and loading logic

use crate::inference::session::DEFAULT_MAX_TOKENS;
use crate::provider::{GeminiConfig, MistralConfig, OpenAiConfig, ProviderKind};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory of the on-disk model cache
    pub models_root: PathBuf,
    /// Provider used when the caller does not name one
    pub default_provider: ProviderKind,
    /// Catalog id of the model the local provider runs
    pub local_model: String,
    /// Hard ceiling on generated tokens per request
    pub max_tokens: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai: Option<OpenAiConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gemini: Option<GeminiConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mistral: Option<MistralConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            models_root: default_models_root(),
            default_provider: ProviderKind::Local,
            local_model: "mlx-community/Llama-3.2-3B-Instruct-4bit".to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            openai: None,
            gemini: None,
            mistral: None,
        }
    }
}

fn default_models_root() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("scribe-engine/models"))
        .unwrap_or_else(|| PathBuf::from("/tmp/scribe-engine/models"))
}

impl EngineConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(root) = std::env::var("SCRIBE_ENGINE_MODELS_ROOT") {
            config.models_root = PathBuf::from(root);
        }
        if let Ok(provider) = std::env::var("SCRIBE_ENGINE_PROVIDER") {
            config.default_provider = provider
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid SCRIBE_ENGINE_PROVIDER value")?;
        }
        if let Ok(model) = std::env::var("SCRIBE_ENGINE_LOCAL_MODEL") {
            config.local_model = model;
        }
        if let Ok(max_tokens) = std::env::var("SCRIBE_ENGINE_MAX_TOKENS") {
            config.max_tokens = max_tokens
                .parse()
                .context("Invalid SCRIBE_ENGINE_MAX_TOKENS value")?;
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            anyhow::bail!("max_tokens must be > 0");
        }
        if self.local_model.is_empty() {
            anyhow::bail!("local_model cannot be empty");
        }

        // The selected default provider must be usable
        match self.default_provider {
            ProviderKind::Local => {}
            ProviderKind::OpenAiCompatible => {
                let configured = self.openai.as_ref().is_some_and(|c| !c.api_key.is_empty());
                if !configured {
                    anyhow::bail!("openai selected as default provider but no API key configured");
                }
            }
            ProviderKind::Gemini => {
                let configured = self.gemini.as_ref().is_some_and(|c| !c.api_key.is_empty());
                if !configured {
                    anyhow::bail!("gemini selected as default provider but no API key configured");
                }
            }
            ProviderKind::Mistral => {
                let configured = self.mistral.as_ref().is_some_and(|c| !c.api_key.is_empty());
                if !configured {
                    anyhow::bail!("mistral selected as default provider but no API key configured");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_provider, ProviderKind::Local);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: EngineConfig = toml::from_str(
            r#"
            default_provider = "mistral"
            max_tokens = 4096

            [mistral]
            api_key = "key"
            "#,
        )
        .unwrap();
        assert_eq!(config.default_provider, ProviderKind::Mistral);
        assert_eq!(config.max_tokens, 4096);
        assert!(config.validate().is_ok());
        // Unspecified fields keep their defaults
        assert!(!config.local_model.is_empty());
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let config = EngineConfig {
            max_tokens: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_default_without_key_rejected() {
        let config = EngineConfig {
            default_provider: ProviderKind::OpenAiCompatible,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            default_provider: ProviderKind::OpenAiCompatible,
            openai: Some(OpenAiConfig {
                api_key: "sk-test".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "local_model = \"org/tiny\"\n").unwrap();

        let config = EngineConfig::load(Some(path)).unwrap();
        assert_eq!(config.local_model, "org/tiny");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = EngineConfig::load(Some(PathBuf::from("/nonexistent/engine.toml")));
        assert!(err.is_err());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = EngineConfig {
            mistral: Some(MistralConfig {
                api_key: "key".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.local_model, config.local_model);
        assert_eq!(parsed.mistral.unwrap().api_key, "key");
    }
}
