//! Prompt assembly
//!
//! Merges system prompt, user prompt, and OCR-extracted text from attached
//! images into the single input fed to a model. The concatenation order is
//! load-bearing: callers and tests depend on the exact
//! `"{system}\n\n{user}\n\nOCR Extracted Text:\n{ocr}"` shape.

use crate::inference::session::GenerationRequest;
use crate::ocr::{CONFIDENCE_THRESHOLD, TextRecognizer};
use std::sync::Arc;

/// Assembles generation input from a request's prompts and attached media.
#[derive(Clone)]
pub struct PromptAssembler {
    recognizer: Arc<dyn TextRecognizer>,
}

impl PromptAssembler {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Build the final model input for a request.
    ///
    /// Video attachments are accepted but not incorporated; there is no
    /// defined video-to-text extraction policy yet.
    pub async fn assemble(&self, request: &GenerationRequest) -> String {
        let user_prompt = self
            .merge_ocr_text(&request.user_prompt, &request.images)
            .await;

        match &request.system_prompt {
            Some(system) => format!("{}\n\n{}", system, user_prompt),
            None => user_prompt,
        }
    }

    /// Run OCR over each image and append recognized text to the user prompt.
    ///
    /// Recognition failures are logged and swallowed; one bad image never
    /// fails the generation, and text from the remaining images still lands
    /// in the prompt. Lines below the confidence threshold are dropped here,
    /// not inside the capability.
    pub async fn merge_ocr_text(&self, user_prompt: &str, images: &[Vec<u8>]) -> String {
        let mut extracted = String::new();

        for image in images {
            match self.recognizer.recognize(image).await {
                Ok(lines) => {
                    let text = lines
                        .iter()
                        .filter(|line| line.confidence >= CONFIDENCE_THRESHOLD)
                        .map(|line| line.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" ");
                    if !text.is_empty() {
                        extracted.push_str(&text);
                        extracted.push('\n');
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "OCR failed for attached image");
                }
            }
        }

        if extracted.is_empty() {
            user_prompt.to_string()
        } else {
            format!("{}\n\nOCR Extracted Text:\n{}", user_prompt, extracted)
        }
    }
}
