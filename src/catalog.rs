//! Built-in model catalog
//!
//! Static registry of the local models the engine knows how to fetch and run.
//! Descriptors are immutable; all runtime state lives on the lifecycle
//! manager's records.

use serde::{Deserialize, Serialize};

/// System prompt applied when a request does not carry its own.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful writing assistant.";

/// Immutable identity and download metadata for one local model variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Hub identifier, e.g. "mlx-community/Llama-3.2-3B-Instruct-4bit"
    pub model_id: String,
    /// Human-readable name for UI surfaces
    pub display_name: String,
    /// Approximate download size label, e.g. "1.8 GB"
    pub approx_size: String,
    /// System prompt used when the caller supplies none
    pub default_system_prompt: String,
}

impl ModelDescriptor {
    pub fn new(model_id: &str, display_name: &str, approx_size: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            display_name: display_name.to_string(),
            approx_size: approx_size.to_string(),
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Static registry mapping model identifiers to download metadata.
///
/// Defined once at process start; the lifecycle manager seeds one record per
/// descriptor.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    descriptors: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// Catalog of models shipped with the engine.
    pub fn builtin() -> Self {
        Self {
            descriptors: vec![
                ModelDescriptor::new(
                    "mlx-community/Llama-3.2-1B-Instruct-4bit",
                    "Llama 3.2 1B (4-bit)",
                    "0.7 GB",
                ),
                ModelDescriptor::new(
                    "mlx-community/Llama-3.2-3B-Instruct-4bit",
                    "Llama 3.2 3B (4-bit)",
                    "1.8 GB",
                ),
            ],
        }
    }

    /// Build a catalog from an explicit descriptor list.
    pub fn with_descriptors(descriptors: Vec<ModelDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Look up a descriptor by model id.
    pub fn get(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.descriptors.iter().find(|d| d.model_id == model_id)
    }

    pub fn list(&self) -> &[ModelDescriptor] {
        &self.descriptors
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.get(model_id).is_some()
    }
}
