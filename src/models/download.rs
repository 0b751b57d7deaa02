//! Model download capability
//!
//! The lifecycle manager consumes downloads through the [`ModelFetcher`] seam;
//! the production implementation fetches from HuggingFace Hub via the native
//! hf-hub crate. Progress is reported per completed file and cancellation is
//! checked cooperatively between files.

use crate::cancel::CancelFlag;
use crate::catalog::ModelDescriptor;
use crate::error::DownloadError;
use async_trait::async_trait;
use hf_hub::api::tokio::{ApiBuilder, ApiRepo};
use std::path::{Path, PathBuf};

/// External download capability.
///
/// `dest` is the model's cache directory under the models root. On success the
/// directory must be non-empty; on failure (including cancellation) the
/// fetcher leaves whatever partial files it wrote for a later retry to reuse.
#[async_trait]
pub trait ModelFetcher: Send + Sync {
    async fn fetch(
        &self,
        descriptor: &ModelDescriptor,
        dest: &Path,
        progress: &(dyn Fn(f64) + Send + Sync),
        cancel: &CancelFlag,
    ) -> Result<(), DownloadError>;
}

/// Production fetcher backed by HuggingFace Hub.
///
/// hf-hub lays files out as `models--{org}--{name}/snapshots/{revision}/...`
/// under its cache dir, which matches the engine's cache layout when the
/// cache dir is the models root.
pub struct HfFetcher {
    models_root: PathBuf,
}

impl HfFetcher {
    pub fn new(models_root: PathBuf) -> Self {
        Self { models_root }
    }

    async fn get_file(
        &self,
        repo: &ApiRepo,
        file: &str,
        cancel: &CancelFlag,
    ) -> Result<PathBuf, DownloadError> {
        if cancel.is_set() {
            return Err(DownloadError::Cancelled);
        }
        tracing::debug!(file = %file, "Downloading file");
        repo.get(file)
            .await
            .map_err(|e| DownloadError::Network(format!("failed to download {}: {}", file, e)))
    }
}

#[async_trait]
impl ModelFetcher for HfFetcher {
    async fn fetch(
        &self,
        descriptor: &ModelDescriptor,
        _dest: &Path,
        progress: &(dyn Fn(f64) + Send + Sync),
        cancel: &CancelFlag,
    ) -> Result<(), DownloadError> {
        tracing::info!(model_id = %descriptor.model_id, "Starting model download via hf-hub");

        let api = ApiBuilder::new()
            .with_cache_dir(self.models_root.clone())
            .build()
            .map_err(|e| DownloadError::Storage(format!("failed to create HF API client: {}", e)))?;

        let repo = api.model(descriptor.model_id.clone());

        let essential_files = ["config.json", "tokenizer.json"];
        let optional_files = ["tokenizer_config.json", "special_tokens_map.json"];

        // Progress steps: essential files, one weights step, optional files.
        let total_steps = essential_files.len() + 1 + optional_files.len();
        let mut completed = 0usize;
        let step = |completed: usize| {
            progress((completed as f64 / total_steps as f64).min(1.0));
        };

        for file in &essential_files {
            self.get_file(&repo, file, cancel).await?;
            completed += 1;
            step(completed);
        }

        // Weights: safetensors preferred, sharded index as fallback
        if cancel.is_set() {
            return Err(DownloadError::Cancelled);
        }
        let mut downloaded_weights = false;
        if repo.get("model.safetensors").await.is_ok() {
            downloaded_weights = true;
        } else if let Ok(index_path) = repo.get("model.safetensors.index.json").await {
            self.fetch_shards(&repo, &index_path, cancel).await?;
            downloaded_weights = true;
        }
        if !downloaded_weights {
            tracing::warn!(
                model_id = %descriptor.model_id,
                "No standard weight files found, model may use custom format"
            );
        }
        completed += 1;
        step(completed);

        for file in &optional_files {
            if cancel.is_set() {
                return Err(DownloadError::Cancelled);
            }
            if repo.get(file).await.is_ok() {
                tracing::debug!(model_id = %descriptor.model_id, file = %file, "Downloaded optional file");
            }
            completed += 1;
            step(completed);
        }

        progress(1.0);
        tracing::info!(model_id = %descriptor.model_id, "Model download complete");
        Ok(())
    }
}

impl HfFetcher {
    /// Download the shard files referenced by a safetensors index.
    async fn fetch_shards(
        &self,
        repo: &ApiRepo,
        index_path: &Path,
        cancel: &CancelFlag,
    ) -> Result<(), DownloadError> {
        let index_content = tokio::fs::read_to_string(index_path)
            .await
            .map_err(|e| DownloadError::Storage(format!("failed to read index file: {}", e)))?;

        let index: serde_json::Value = serde_json::from_str(&index_content)
            .map_err(|e| DownloadError::Storage(format!("failed to parse index file: {}", e)))?;

        if let Some(weight_map) = index.get("weight_map").and_then(|v| v.as_object()) {
            let shards: std::collections::HashSet<&str> =
                weight_map.values().filter_map(|v| v.as_str()).collect();

            tracing::info!(shard_count = shards.len(), "Downloading sharded weights");

            for shard in shards {
                self.get_file(repo, shard, cancel).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetcher_construction() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fetcher = HfFetcher::new(temp_dir.path().to_path_buf());
        assert_eq!(fetcher.models_root, temp_dir.path());
    }

    #[tokio::test]
    #[ignore = "requires network access and downloads a real model"]
    async fn test_fetch_small_model() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fetcher = HfFetcher::new(temp_dir.path().to_path_buf());
        let descriptor = ModelDescriptor::new(
            "hf-internal-testing/tiny-random-gpt2",
            "Tiny GPT-2",
            "1 MB",
        );
        let dest = crate::models::cache::model_dir(temp_dir.path(), &descriptor.model_id);
        let result = fetcher
            .fetch(&descriptor, &dest, &|_| {}, &CancelFlag::new())
            .await;
        assert!(result.is_ok(), "Download failed: {:?}", result.err());
        assert!(crate::models::cache::is_model_cached(
            temp_dir.path(),
            &descriptor.model_id
        ));
    }

    #[tokio::test]
    async fn test_fetch_respects_preset_cancel() {
        let temp_dir = tempfile::tempdir().unwrap();
        let fetcher = HfFetcher::new(temp_dir.path().to_path_buf());
        let descriptor = ModelDescriptor::new("org/model", "Model", "1 GB");
        let dest = crate::models::cache::model_dir(temp_dir.path(), &descriptor.model_id);
        let cancel = CancelFlag::new();
        cancel.set();
        let result = fetcher.fetch(&descriptor, &dest, &|_| {}, &cancel).await;
        assert!(matches!(result, Err(DownloadError::Cancelled)));
    }
}
