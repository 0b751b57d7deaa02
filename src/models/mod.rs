//! Local model management
//!
//! Provides functionality for:
//! - The on-disk model cache layout (one directory per model id)
//! - Downloading model files from HuggingFace Hub
//! - The per-model lifecycle state machine (idle/downloading/downloaded/loaded)
//! - The runtime seams that load weights and produce tokens

pub mod cache;
pub mod download;
pub mod lifecycle;
pub mod runtime;

pub use cache::{cached_models, is_model_cached, model_dir};
pub use download::{HfFetcher, ModelFetcher};
pub use lifecycle::{LifecycleState, ModelLifecycleManager, ModelSnapshot};
pub use runtime::{GenerateParams, ModelHandle, ModelRuntime, TokenGenerator, TokenSource};
