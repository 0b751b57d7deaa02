//! OCR capability seam
//!
//! The recognition engine itself is an external collaborator; the engine only
//! consumes recognized lines with their confidence. The 0.4 confidence
//! threshold is applied by the consumer (the prompt assembler), not assumed
//! inside the capability.

use crate::error::RecognitionError;
use async_trait::async_trait;

/// Minimum confidence for a recognized line to be included in prompt text.
pub const CONFIDENCE_THRESHOLD: f32 = 0.4;

/// One recognized line of text with the recognizer's confidence in it.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrLine {
    pub text: String,
    pub confidence: f32,
}

impl OcrLine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

/// External text-recognition capability.
///
/// Fails with [`RecognitionError`] on malformed input. Low-confidence results
/// are returned as-is; filtering is the caller's concern.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<Vec<OcrLine>, RecognitionError>;
}

/// Recognizer used when no OCR backend is linked in. Recognizes nothing.
#[derive(Debug, Default)]
pub struct NullRecognizer;

#[async_trait]
impl TextRecognizer for NullRecognizer {
    async fn recognize(&self, _image: &[u8]) -> Result<Vec<OcrLine>, RecognitionError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_recognizer_returns_nothing() {
        let recognizer = NullRecognizer;
        let lines = recognizer.recognize(&[1, 2, 3]).await.unwrap();
        assert!(lines.is_empty());
    }
}
