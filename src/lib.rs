//! Scribe Engine - On-device LLM lifecycle and inference engine
//!
//! A lightweight Rust library that manages local model downloads, weight
//! loading, and streaming text generation for a desktop writing assistant,
//! with remote chat-completion providers behind the same interface.

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod inference;
pub mod models;
pub mod ocr;
pub mod provider;

pub use cancel::CancelFlag;
pub use catalog::{ModelCatalog, ModelDescriptor};
pub use config::EngineConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, EngineResult};
pub use inference::{GenerationEvent, GenerationRequest, GenerationResult, GenerationStream};
pub use models::{LifecycleState, ModelLifecycleManager, ModelSnapshot};
pub use provider::{Provider, ProviderKind, TextProvider};
