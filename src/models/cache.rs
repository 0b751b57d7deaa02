//! Model cache layout
//!
//! One directory per model identifier under the models root:
//! ```text
//! {models_root}/
//! ├── models--mlx-community--Llama-3.2-3B-Instruct-4bit/
//! │   └── ... model files ...
//! └── models--mlx-community--Llama-3.2-1B-Instruct-4bit/
//!     └── ...
//! ```
//! Presence of a non-empty directory implies the model is downloaded; the
//! lifecycle manager re-derives state from the filesystem at startup rather
//! than persisting it separately.

use std::path::{Path, PathBuf};

/// Convert a model id to its cache directory name.
///
/// e.g. "mlx-community/Llama-3.2-3B-Instruct-4bit"
/// -> "models--mlx-community--Llama-3.2-3B-Instruct-4bit"
pub fn model_dir_name(model_id: &str) -> String {
    format!("models--{}", model_id.replace('/', "--"))
}

/// Convert a cache directory name back to a model id.
pub fn dir_name_to_model_id(dir_name: &str) -> Option<String> {
    dir_name
        .strip_prefix("models--")
        .map(|s| s.replacen("--", "/", 1))
}

/// Full path of a model's cache directory.
pub fn model_dir(models_root: &Path, model_id: &str) -> PathBuf {
    models_root.join(model_dir_name(model_id))
}

/// Whether the model has a non-empty cache directory.
pub fn is_model_cached(models_root: &Path, model_id: &str) -> bool {
    let dir = model_dir(models_root, model_id);
    match std::fs::read_dir(&dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

/// Total size of a model's cached files in bytes, or None if not cached.
pub fn cache_size(models_root: &Path, model_id: &str) -> Option<u64> {
    let dir = model_dir(models_root, model_id);
    if !dir.exists() {
        return None;
    }
    Some(dir_size(&dir))
}

/// Recursively calculate directory size.
fn dir_size(path: &Path) -> u64 {
    let mut size = 0;

    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                size += dir_size(&path);
            } else if let Ok(metadata) = std::fs::metadata(&path) {
                size += metadata.len();
            }
        }
    }

    size
}

/// List model ids with a non-empty cache directory under the models root.
pub fn cached_models(models_root: &Path) -> Vec<String> {
    let mut models = Vec::new();

    if let Ok(entries) = std::fs::read_dir(models_root) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(model_id) = dir_name_to_model_id(&name)
                && is_model_cached(models_root, &model_id)
            {
                models.push(model_id);
            }
        }
    }

    models.sort();
    models
}
