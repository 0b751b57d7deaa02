//! Provider facade
//!
//! One interface over the local inference session and the remote
//! chat-completion backends. Provider selection is a closed set of variants
//! dispatched through [`TextProvider`], each variant carrying its own
//! configuration.

pub mod gemini;
pub mod local;
pub mod mistral;
pub mod openai;
pub mod remote;

pub use gemini::{GeminiConfig, GeminiProvider};
pub use local::LocalProvider;
pub use mistral::{MistralConfig, MistralProvider};
pub use openai::{OpenAiConfig, OpenAiProvider};

use crate::error::ProviderError;
use crate::inference::session::GenerationRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Capability interface every backend implements.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Process a request to completion and return the final text.
    async fn process_text(&self, request: GenerationRequest) -> Result<String, ProviderError>;

    /// Request cooperative cancellation of the in-flight call.
    fn cancel(&self);
}

/// Which backend a request is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "openai")]
    OpenAiCompatible,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "mistral")]
    Mistral,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::OpenAiCompatible => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
            Self::Mistral => write!(f, "mistral"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAiCompatible),
            "gemini" => Ok(Self::Gemini),
            "mistral" => Ok(Self::Mistral),
            other => Err(format!(
                "unknown provider '{}' (expected local, openai, gemini, or mistral)",
                other
            )),
        }
    }
}

/// Tagged provider variant, one per backend.
pub enum Provider {
    Local(LocalProvider),
    OpenAiCompatible(OpenAiProvider),
    Gemini(GeminiProvider),
    Mistral(MistralProvider),
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Provider").field(&self.kind()).finish()
    }
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Local(_) => ProviderKind::Local,
            Self::OpenAiCompatible(_) => ProviderKind::OpenAiCompatible,
            Self::Gemini(_) => ProviderKind::Gemini,
            Self::Mistral(_) => ProviderKind::Mistral,
        }
    }
}

#[async_trait]
impl TextProvider for Provider {
    async fn process_text(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        match self {
            Self::Local(p) => p.process_text(request).await,
            Self::OpenAiCompatible(p) => p.process_text(request).await,
            Self::Gemini(p) => p.process_text(request).await,
            Self::Mistral(p) => p.process_text(request).await,
        }
    }

    fn cancel(&self) {
        match self {
            Self::Local(p) => p.cancel(),
            Self::OpenAiCompatible(p) => p.cancel(),
            Self::Gemini(p) => p.cancel(),
            Self::Mistral(p) => p.cancel(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_roundtrip() {
        for kind in [
            ProviderKind::Local,
            ProviderKind::OpenAiCompatible,
            ProviderKind::Gemini,
            ProviderKind::Mistral,
        ] {
            let parsed: ProviderKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_provider_kind_rejects_unknown() {
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&ProviderKind::OpenAiCompatible).unwrap(),
            "\"openai\""
        );
        let kind: ProviderKind = serde_json::from_str("\"mistral\"").unwrap();
        assert_eq!(kind, ProviderKind::Mistral);
    }
}
