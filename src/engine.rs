//! Composition root
//!
//! Wires the catalog, fetcher, runtime, recognizer, and providers together
//! from an [`EngineConfig`]. The embedding application injects its platform
//! capabilities (OCR backend, model runtime) here; nothing in the engine
//! reaches for ambient global state.

use crate::catalog::ModelCatalog;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::models::download::{HfFetcher, ModelFetcher};
use crate::models::lifecycle::ModelLifecycleManager;
use crate::models::runtime::{ModelHandle, ModelRuntime};
use crate::ocr::{NullRecognizer, TextRecognizer};
use crate::provider::{
    GeminiProvider, LocalProvider, MistralProvider, OpenAiProvider, Provider, ProviderKind,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Runtime used when the embedder supplies none. Every load fails; model
/// downloads and deletion still work, which is all the CLI needs.
struct NoRuntime;

#[async_trait]
impl ModelRuntime for NoRuntime {
    async fn load(
        &self,
        descriptor: &crate::catalog::ModelDescriptor,
        _cache_path: &Path,
    ) -> EngineResult<ModelHandle> {
        Err(EngineError::ModelNotAvailable {
            model_id: descriptor.model_id.clone(),
        })
    }
}

pub struct EngineBuilder {
    config: EngineConfig,
    catalog: Option<ModelCatalog>,
    fetcher: Option<Arc<dyn ModelFetcher>>,
    runtime: Option<Arc<dyn ModelRuntime>>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            catalog: None,
            fetcher: None,
            runtime: None,
            recognizer: None,
        }
    }

    pub fn with_catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ModelFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn ModelRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn build(self) -> Engine {
        let catalog = self.catalog.unwrap_or_else(ModelCatalog::builtin);
        let recognizer = self
            .recognizer
            .unwrap_or_else(|| Arc::new(NullRecognizer));
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HfFetcher::new(self.config.models_root.clone())));
        let runtime = self.runtime.unwrap_or_else(|| Arc::new(NoRuntime));

        let manager = Arc::new(ModelLifecycleManager::new(
            catalog,
            fetcher,
            runtime,
            self.config.models_root.clone(),
        ));

        let mut providers = HashMap::new();
        providers.insert(
            ProviderKind::Local,
            Provider::Local(LocalProvider::new(
                Arc::clone(&manager),
                &self.config.local_model,
                Arc::clone(&recognizer),
            )),
        );
        if let Some(openai) = self.config.openai.clone() {
            providers.insert(
                ProviderKind::OpenAiCompatible,
                Provider::OpenAiCompatible(OpenAiProvider::new(openai, Arc::clone(&recognizer))),
            );
        }
        if let Some(gemini) = self.config.gemini.clone() {
            providers.insert(
                ProviderKind::Gemini,
                Provider::Gemini(GeminiProvider::new(gemini, Arc::clone(&recognizer))),
            );
        }
        if let Some(mistral) = self.config.mistral.clone() {
            providers.insert(
                ProviderKind::Mistral,
                Provider::Mistral(MistralProvider::new(mistral, Arc::clone(&recognizer))),
            );
        }

        Engine {
            config: self.config,
            manager,
            providers,
        }
    }
}

/// Top-level handle owning the lifecycle manager and configured providers.
pub struct Engine {
    config: EngineConfig,
    manager: Arc<ModelLifecycleManager>,
    providers: HashMap<ProviderKind, Provider>,
}

impl Engine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn manager(&self) -> Arc<ModelLifecycleManager> {
        Arc::clone(&self.manager)
    }

    /// The provider for the given kind, if its configuration is present.
    pub fn provider(&self, kind: ProviderKind) -> EngineResult<&Provider> {
        self.providers
            .get(&kind)
            .ok_or_else(|| EngineError::ProviderNotConfigured {
                name: kind.to_string(),
            })
    }

    pub fn default_provider(&self) -> EngineResult<&Provider> {
        self.provider(self.config.default_provider)
    }
}
