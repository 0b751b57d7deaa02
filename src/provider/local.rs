//! Local provider
//!
//! Backed by the lifecycle manager and an inference session per loaded model
//! handle. `process_text` drains the event stream to the final text; UI
//! callers that want incremental display use `generate_stream` directly.

use crate::error::{EngineError, ProviderError};
use crate::inference::prompt::PromptAssembler;
use crate::inference::session::{GenerationRequest, InferenceSession};
use crate::inference::stream::GenerationStream;
use crate::models::lifecycle::ModelLifecycleManager;
use crate::ocr::TextRecognizer;
use crate::provider::TextProvider;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

pub struct LocalProvider {
    manager: Arc<ModelLifecycleManager>,
    model_id: String,
    assembler: PromptAssembler,
    /// Session for the currently loaded handle. Replaced when the handle
    /// changes (delete + re-download + reload yields a fresh handle).
    session: Mutex<Option<InferenceSession>>,
}

impl LocalProvider {
    pub fn new(
        manager: Arc<ModelLifecycleManager>,
        model_id: &str,
        recognizer: Arc<dyn TextRecognizer>,
    ) -> Self {
        Self {
            manager,
            model_id: model_id.to_string(),
            assembler: PromptAssembler::new(recognizer),
            session: Mutex::new(None),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Assemble the prompt, ensure the model is loaded, and start a
    /// generation, returning the event stream for incremental consumption.
    pub async fn generate_stream(
        &self,
        mut request: GenerationRequest,
    ) -> Result<GenerationStream, ProviderError> {
        if request.system_prompt.is_none()
            && let Some(descriptor) = self.manager.descriptor(&self.model_id)
        {
            request.system_prompt = Some(descriptor.default_system_prompt.clone());
        }

        let prompt = self.assembler.assemble(&request).await;

        let handle = self
            .manager
            .load_model(&self.model_id)
            .await
            .map_err(|e| match e {
                EngineError::ModelNotDownloaded { model_id } => {
                    ProviderError::Engine(EngineError::ModelNotAvailable { model_id })
                }
                other => ProviderError::Engine(other),
            })?;

        let session = {
            let mut slot = self.session.lock().expect("session lock poisoned");
            match slot.as_ref() {
                Some(session) if Arc::ptr_eq(session.handle(), &handle) => session.clone(),
                _ => {
                    let session = InferenceSession::new(handle);
                    *slot = Some(session.clone());
                    session
                }
            }
        };

        session
            .generate(prompt, &request)
            .map_err(ProviderError::Engine)
    }
}

#[async_trait]
impl TextProvider for LocalProvider {
    async fn process_text(&self, request: GenerationRequest) -> Result<String, ProviderError> {
        let stream = self.generate_stream(request).await?;
        let result = stream.collect_result().await.map_err(ProviderError::Engine)?;
        Ok(result.output)
    }

    fn cancel(&self) {
        if let Some(session) = self.session.lock().expect("session lock poisoned").as_ref() {
            session.cancel();
        }
    }
}
