//! Error taxonomy for the engine
//!
//! Lifecycle and session errors are terminal for the triggering call but never
//! corrupt state: every failure path leaves the model state machine in a
//! previously valid state.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by the model lifecycle manager and inference session.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("download failed for '{model_id}': {source}")]
    Download {
        model_id: String,
        source: DownloadError,
    },

    #[error("model '{model_id}' is not downloaded")]
    ModelNotDownloaded { model_id: String },

    #[error("model '{model_id}' is not available")]
    ModelNotAvailable { model_id: String },

    #[error("cannot delete '{model_id}' while a download is in progress")]
    DeleteWhileDownloading { model_id: String },

    #[error("no cached files found for '{model_id}'")]
    NotFound { model_id: String },

    #[error("maximum retry attempts reached for '{model_id}'")]
    MaxRetriesExceeded { model_id: String },

    #[error("model '{model_id}' is not in the catalog")]
    UnknownModel { model_id: String },

    #[error("provider '{name}' is not configured")]
    ProviderNotConfigured { name: String },

    /// A second `generate` was issued while one was active. The session never
    /// queues; the caller must wait for the active generation to finish.
    #[error("generation already in progress")]
    GenerationAlreadyInProgress,

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

/// Failure of the external download capability.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("download cancelled")]
    Cancelled,
}

/// Failure of the external OCR capability.
///
/// Recovered locally by the prompt assembler: recognition failures degrade to
/// empty extracted text and are never surfaced as generation errors.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("invalid image data")]
    InvalidImage,

    #[error("text recognition failed: {0}")]
    Failed(String),
}

/// Errors returned by a provider's `process_text`.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_error_messages() {
        let err = EngineError::DeleteWhileDownloading {
            model_id: "org/model".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot delete 'org/model' while a download is in progress"
        );

        let err = EngineError::MaxRetriesExceeded {
            model_id: "org/model".into(),
        };
        assert!(err.to_string().contains("maximum retry attempts"));
    }

    #[test]
    fn test_download_error_wrapping() {
        let err = EngineError::Download {
            model_id: "org/model".into(),
            source: DownloadError::Network("connection reset".into()),
        };
        assert_eq!(
            err.to_string(),
            "download failed for 'org/model': network error: connection reset"
        );
    }

    #[test]
    fn test_provider_error_from_engine() {
        let err: ProviderError = EngineError::GenerationAlreadyInProgress.into();
        assert_eq!(err.to_string(), "generation already in progress");
    }
}
