//! Local inference pipeline
//!
//! Prompt assembly (OCR merge), the single-flight inference session with its
//! token budget, and the streaming event channel the UI consumes.

pub mod prompt;
pub mod session;
pub mod stream;

pub use prompt::PromptAssembler;
pub use session::{GenerationRequest, InferenceSession};
pub use stream::{GenerationEvent, GenerationResult, GenerationStream};
