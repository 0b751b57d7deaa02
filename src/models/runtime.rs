//! Model runtime seams
//!
//! The tensor math is a black box behind two traits: [`ModelRuntime`] turns a
//! cached model directory into a [`TokenGenerator`], and a generator started
//! on a prompt yields decoded tokens one at a time through a [`TokenSource`].
//! The inference session drives the source as a cancellable pull loop.

use crate::catalog::ModelDescriptor;
use crate::error::EngineResult;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Exclusive runtime handle to an instantiated model.
pub type ModelHandle = Arc<dyn TokenGenerator>;

/// Sampling parameters for one generation.
#[derive(Debug, Clone, Copy)]
pub struct GenerateParams {
    pub temperature: f32,
    /// Seeded from the current time for each call; generations are not
    /// intended for deterministic replay.
    pub seed: u64,
}

impl GenerateParams {
    pub fn seeded_now(temperature: f32) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self { temperature, seed }
    }
}

/// Pull-based token iterator for one in-flight generation.
///
/// Returns `None` once the model reaches its natural stop condition. The
/// consumer decides whether to pull the next item, which is where the token
/// budget and cancellation checks live.
#[async_trait]
pub trait TokenSource: Send {
    async fn next_token(&mut self) -> EngineResult<Option<String>>;
}

/// Generation capability of one loaded model.
#[async_trait]
pub trait TokenGenerator: Send + Sync + std::fmt::Debug {
    async fn start(
        &self,
        prompt: &str,
        params: GenerateParams,
    ) -> EngineResult<Box<dyn TokenSource>>;
}

/// External weights loader. Loading is costly and explicit; the lifecycle
/// manager invokes it only on the `Downloaded -> Loaded` transition.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    async fn load(
        &self,
        descriptor: &ModelDescriptor,
        cache_path: &Path,
    ) -> EngineResult<ModelHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_params_carry_temperature() {
        let params = GenerateParams::seeded_now(0.6);
        assert_eq!(params.temperature, 0.6);
    }

    #[test]
    fn test_seeds_advance_over_time() {
        let a = GenerateParams::seeded_now(0.6);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = GenerateParams::seeded_now(0.6);
        assert!(b.seed >= a.seed);
    }
}
