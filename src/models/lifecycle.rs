//! Per-model lifecycle state machine
//!
//! One [`ModelRecord`] per catalog descriptor, owned exclusively by the
//! [`ModelLifecycleManager`]: all mutations go through the manager's methods,
//! never concurrently for the same descriptor. The state machine itself is the
//! concurrency control for the cache directory — deletion is rejected while a
//! download is in flight, and a second download of the same model is a no-op.
//!
//! States: `Idle -> Downloading -> Downloaded -> Loaded`, with `Downloading`
//! failing back to `Idle` (error recorded) and explicit deletion returning any
//! non-downloading state to `Idle`.

use crate::cancel::CancelFlag;
use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::error::{DownloadError, EngineError, EngineResult};
use crate::models::cache;
use crate::models::download::ModelFetcher;
use crate::models::runtime::{ModelHandle, ModelRuntime};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Retry cap for failed downloads.
pub const MAX_RETRIES: u32 = 3;

/// Error string recorded when a download is cancelled by the user.
pub const CANCELLED_MESSAGE: &str = "Download cancelled";

/// Observable lifecycle state of a model record. Exactly one holds at any
/// observation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Not downloaded (or deleted)
    Idle,
    /// A download is in flight
    Downloading,
    /// Files are on disk, weights not resident
    Downloaded,
    /// Weights are resident and ready to generate
    Loaded,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Downloading => write!(f, "downloading"),
            Self::Downloaded => write!(f, "downloaded"),
            Self::Loaded => write!(f, "loaded"),
        }
    }
}

/// Internal state, carrying the runtime handle while loaded.
enum RecordState {
    Idle,
    Downloading,
    Downloaded,
    Loaded(ModelHandle),
}

impl RecordState {
    fn kind(&self) -> LifecycleState {
        match self {
            Self::Idle => LifecycleState::Idle,
            Self::Downloading => LifecycleState::Downloading,
            Self::Downloaded => LifecycleState::Downloaded,
            Self::Loaded(_) => LifecycleState::Loaded,
        }
    }
}

/// Download progress cell shared with the in-flight fetch task.
///
/// Stores the fraction as f64 bits; `fetch_max` keeps observed progress
/// non-decreasing for a single download (valid because non-negative IEEE
/// doubles order the same as their bit patterns). Each download gets its own
/// cell, like its own epoch, so a superseded fetch task writes only into a
/// cell nothing observes anymore.
#[derive(Debug, Default)]
struct ProgressCell(AtomicU64);

impl ProgressCell {
    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::SeqCst))
    }

    fn advance(&self, fraction: f64) {
        let clamped = fraction.clamp(0.0, 1.0);
        self.0.fetch_max(clamped.to_bits(), Ordering::SeqCst);
    }

    fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// Mutable runtime state for one descriptor.
struct ModelRecord {
    descriptor: ModelDescriptor,
    state: RecordState,
    cache_path: Option<PathBuf>,
    progress: Arc<ProgressCell>,
    last_error: Option<String>,
    retry_count: u32,
    /// Bumped on every download start; a settling task whose epoch no longer
    /// matches was cancelled or superseded and must not apply its outcome.
    epoch: u64,
    cancel: Option<CancelFlag>,
    task: Option<JoinHandle<()>>,
    added_at: DateTime<Utc>,
}

/// Point-in-time view of a record for UI and CLI surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSnapshot {
    pub model_id: String,
    pub display_name: String,
    pub approx_size: String,
    pub state: LifecycleState,
    pub download_progress: f64,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    pub added_at: DateTime<Utc>,
}

/// Owner of all model records and the cache directory beneath them.
pub struct ModelLifecycleManager {
    records: RwLock<HashMap<String, ModelRecord>>,
    catalog: ModelCatalog,
    fetcher: Arc<dyn ModelFetcher>,
    runtime: Arc<dyn ModelRuntime>,
    models_root: PathBuf,
}

impl ModelLifecycleManager {
    /// Build a manager with one record per catalog descriptor.
    ///
    /// Lifecycle state is not persisted; a non-empty cache directory implies
    /// `Downloaded` at startup.
    pub fn new(
        catalog: ModelCatalog,
        fetcher: Arc<dyn ModelFetcher>,
        runtime: Arc<dyn ModelRuntime>,
        models_root: PathBuf,
    ) -> Self {
        let mut records = HashMap::new();
        for descriptor in catalog.list() {
            let cached = cache::is_model_cached(&models_root, &descriptor.model_id);
            let progress = Arc::new(ProgressCell::default());
            if cached {
                progress.advance(1.0);
            }
            records.insert(
                descriptor.model_id.clone(),
                ModelRecord {
                    descriptor: descriptor.clone(),
                    state: if cached {
                        RecordState::Downloaded
                    } else {
                        RecordState::Idle
                    },
                    cache_path: cached
                        .then(|| cache::model_dir(&models_root, &descriptor.model_id)),
                    progress,
                    last_error: None,
                    retry_count: 0,
                    epoch: 0,
                    cancel: None,
                    task: None,
                    added_at: Utc::now(),
                },
            );
        }

        Self {
            records: RwLock::new(records),
            catalog,
            fetcher,
            runtime,
            models_root,
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn descriptor(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.catalog.get(model_id)
    }

    pub fn models_root(&self) -> &Path {
        &self.models_root
    }

    /// Start downloading a model. No-op if a download is already in flight
    /// for this descriptor; a fresh user-initiated download resets the retry
    /// counter.
    pub async fn start_download(self: &Arc<Self>, model_id: &str) -> EngineResult<()> {
        let mut records = self.records.write().await;
        let record = get_record_mut(&mut records, model_id)?;

        if matches!(record.state, RecordState::Downloading) {
            tracing::debug!(model_id = %model_id, "Download already in flight, ignoring");
            return Ok(());
        }

        record.retry_count = 0;
        self.begin_download(record);
        Ok(())
    }

    /// Retry a failed download. Fails once the retry cap is reached and does
    /// not mutate the counter further.
    pub async fn retry_download(self: &Arc<Self>, model_id: &str) -> EngineResult<()> {
        let mut records = self.records.write().await;
        let record = get_record_mut(&mut records, model_id)?;

        if matches!(record.state, RecordState::Downloading) {
            tracing::debug!(model_id = %model_id, "Download already in flight, ignoring retry");
            return Ok(());
        }
        if record.retry_count >= MAX_RETRIES {
            return Err(EngineError::MaxRetriesExceeded {
                model_id: model_id.to_string(),
            });
        }

        record.retry_count += 1;
        tracing::info!(
            model_id = %model_id,
            attempt = record.retry_count,
            "Retrying download"
        );
        self.begin_download(record);
        Ok(())
    }

    /// Transition the record to `Downloading` and spawn the fetch task.
    /// Caller holds the records write lock.
    fn begin_download(self: &Arc<Self>, record: &mut ModelRecord) {
        record.state = RecordState::Downloading;
        record.progress = Arc::new(ProgressCell::default());
        record.last_error = None;
        record.epoch += 1;

        let cancel = CancelFlag::new();
        record.cancel = Some(cancel.clone());

        let manager = Arc::clone(self);
        let descriptor = record.descriptor.clone();
        let epoch = record.epoch;
        let progress = Arc::clone(&record.progress);
        record.task = Some(tokio::spawn(async move {
            manager
                .run_download(descriptor, epoch, progress, cancel)
                .await;
        }));
    }

    async fn run_download(
        &self,
        descriptor: ModelDescriptor,
        epoch: u64,
        progress: Arc<ProgressCell>,
        cancel: CancelFlag,
    ) {
        let dest = cache::model_dir(&self.models_root, &descriptor.model_id);
        let cell = Arc::clone(&progress);
        let on_progress = move |fraction: f64| cell.advance(fraction);

        let result = self
            .fetcher
            .fetch(&descriptor, &dest, &on_progress, &cancel)
            .await;

        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&descriptor.model_id) else {
            return;
        };
        // A cancel or a fresh download may have superseded this task; its
        // outcome no longer applies. Local state was already settled by the
        // canceller.
        if record.epoch != epoch || cancel.is_set() {
            return;
        }
        record.task = None;
        record.cancel = None;

        match result {
            Ok(()) => {
                record.state = RecordState::Downloaded;
                record.cache_path = Some(dest);
                record.progress.advance(1.0);
                tracing::info!(model_id = %descriptor.model_id, "Download complete");
            }
            Err(e) => {
                record.state = RecordState::Idle;
                record.progress.reset();
                record.last_error = Some(e.to_string());
                tracing::warn!(model_id = %descriptor.model_id, error = %e, "Download failed");
            }
        }
    }

    /// Cancel an in-flight download.
    ///
    /// Local state is authoritative for UI purposes: the record transitions to
    /// `Idle` immediately with the cancellation message recorded, and the
    /// underlying task is best-effort terminated. No-op when nothing is
    /// downloading.
    pub async fn cancel_download(&self, model_id: &str) -> EngineResult<()> {
        let mut records = self.records.write().await;
        let record = get_record_mut(&mut records, model_id)?;

        if !matches!(record.state, RecordState::Downloading) {
            tracing::debug!(model_id = %model_id, "No download in flight, ignoring cancel");
            return Ok(());
        }

        if let Some(cancel) = record.cancel.take() {
            cancel.set();
        }
        if let Some(task) = record.task.take() {
            task.abort();
        }
        record.state = RecordState::Idle;
        record.progress = Arc::new(ProgressCell::default());
        record.last_error = Some(CANCELLED_MESSAGE.to_string());
        tracing::info!(model_id = %model_id, "Download cancelled");
        Ok(())
    }

    /// Load a downloaded model and return its runtime handle.
    ///
    /// Idempotent: calling while already `Loaded` returns the existing handle
    /// without side effects. Fails with `ModelNotDownloaded` from any other
    /// state.
    pub async fn load_model(&self, model_id: &str) -> EngineResult<ModelHandle> {
        let (descriptor, cache_path) = {
            let records = self.records.read().await;
            let record = get_record(&records, model_id)?;
            match &record.state {
                RecordState::Loaded(handle) => return Ok(Arc::clone(handle)),
                RecordState::Downloaded => {
                    let path = record.cache_path.clone().ok_or_else(|| {
                        EngineError::ModelNotDownloaded {
                            model_id: model_id.to_string(),
                        }
                    })?;
                    (record.descriptor.clone(), path)
                }
                _ => {
                    return Err(EngineError::ModelNotDownloaded {
                        model_id: model_id.to_string(),
                    });
                }
            }
        };

        // Load without holding the records lock; loading is slow and
        // unrelated models must keep making progress.
        tracing::info!(model_id = %model_id, "Loading model weights");
        let handle = self.runtime.load(&descriptor, &cache_path).await?;

        let mut records = self.records.write().await;
        let record = get_record_mut(&mut records, model_id)?;
        match &record.state {
            // A concurrent load won the race; keep its handle.
            RecordState::Loaded(existing) => Ok(Arc::clone(existing)),
            RecordState::Downloaded => {
                record.state = RecordState::Loaded(Arc::clone(&handle));
                tracing::info!(model_id = %model_id, "Model loaded");
                Ok(handle)
            }
            // Deleted or re-downloading underneath us.
            _ => Err(EngineError::ModelNotAvailable {
                model_id: model_id.to_string(),
            }),
        }
    }

    /// Delete a model's cached artifacts and reset the record to `Idle`.
    ///
    /// A pending download must be cancelled first.
    pub async fn delete_model(&self, model_id: &str) -> EngineResult<()> {
        let mut records = self.records.write().await;
        let record = get_record_mut(&mut records, model_id)?;

        if matches!(record.state, RecordState::Downloading) {
            return Err(EngineError::DeleteWhileDownloading {
                model_id: model_id.to_string(),
            });
        }

        let dir = cache::model_dir(&self.models_root, model_id);
        if !dir.exists() {
            return Err(EngineError::NotFound {
                model_id: model_id.to_string(),
            });
        }

        tokio::fs::remove_dir_all(&dir).await?;
        record.state = RecordState::Idle;
        record.cache_path = None;
        record.progress = Arc::new(ProgressCell::default());
        record.last_error = None;
        tracing::info!(model_id = %model_id, "Model deleted");
        Ok(())
    }

    /// Side-effect-free view of one record.
    pub async fn status(&self, model_id: &str) -> EngineResult<ModelSnapshot> {
        let records = self.records.read().await;
        let record = get_record(&records, model_id)?;
        Ok(self.snapshot(record))
    }

    /// Snapshots of all records, sorted by model id.
    pub async fn list(&self) -> Vec<ModelSnapshot> {
        let records = self.records.read().await;
        let mut snapshots: Vec<_> = records.values().map(|r| self.snapshot(r)).collect();
        snapshots.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        snapshots
    }

    /// Wait for the in-flight download task for this model, if any, to settle.
    pub async fn join_download(&self, model_id: &str) {
        let task = {
            let mut records = self.records.write().await;
            records.get_mut(model_id).and_then(|r| r.task.take())
        };
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Start a download and wait for it to settle. Convenience for one-shot
    /// CLI flows; UI callers poll `status` instead.
    pub async fn download_and_wait(self: &Arc<Self>, model_id: &str) -> EngineResult<()> {
        self.start_download(model_id).await?;
        self.join_download(model_id).await;

        let snapshot = self.status(model_id).await?;
        match snapshot.state {
            LifecycleState::Downloaded | LifecycleState::Loaded => Ok(()),
            _ => {
                let message = snapshot
                    .last_error
                    .unwrap_or_else(|| "download failed".to_string());
                let source = if message == CANCELLED_MESSAGE {
                    DownloadError::Cancelled
                } else {
                    DownloadError::Network(message)
                };
                Err(EngineError::Download {
                    model_id: model_id.to_string(),
                    source,
                })
            }
        }
    }

    fn snapshot(&self, record: &ModelRecord) -> ModelSnapshot {
        ModelSnapshot {
            model_id: record.descriptor.model_id.clone(),
            display_name: record.descriptor.display_name.clone(),
            approx_size: record.descriptor.approx_size.clone(),
            state: record.state.kind(),
            download_progress: record.progress.get(),
            retry_count: record.retry_count,
            last_error: record.last_error.clone(),
            cache_path: record.cache_path.clone(),
            size_bytes: record
                .cache_path
                .as_ref()
                .and_then(|_| cache::cache_size(&self.models_root, &record.descriptor.model_id)),
            added_at: record.added_at,
        }
    }
}

fn get_record<'a>(
    records: &'a HashMap<String, ModelRecord>,
    model_id: &str,
) -> EngineResult<&'a ModelRecord> {
    records.get(model_id).ok_or_else(|| EngineError::UnknownModel {
        model_id: model_id.to_string(),
    })
}

fn get_record_mut<'a>(
    records: &'a mut HashMap<String, ModelRecord>,
    model_id: &str,
) -> EngineResult<&'a mut ModelRecord> {
    records
        .get_mut(model_id)
        .ok_or_else(|| EngineError::UnknownModel {
            model_id: model_id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_state_display() {
        assert_eq!(LifecycleState::Idle.to_string(), "idle");
        assert_eq!(LifecycleState::Downloading.to_string(), "downloading");
        assert_eq!(LifecycleState::Downloaded.to_string(), "downloaded");
        assert_eq!(LifecycleState::Loaded.to_string(), "loaded");
    }

    #[test]
    fn test_progress_cell_monotonic() {
        let cell = ProgressCell::default();
        cell.advance(0.5);
        cell.advance(0.25);
        // A late lower fraction never moves progress backwards
        assert_eq!(cell.get(), 0.5);
        cell.advance(0.75);
        assert_eq!(cell.get(), 0.75);
    }

    #[test]
    fn test_progress_cell_clamps() {
        let cell = ProgressCell::default();
        cell.advance(1.5);
        assert_eq!(cell.get(), 1.0);
        cell.reset();
        assert_eq!(cell.get(), 0.0);
    }

    #[test]
    fn test_snapshot_serializes_state_name() {
        let snapshot = ModelSnapshot {
            model_id: "org/model".into(),
            display_name: "Model".into(),
            approx_size: "1 GB".into(),
            state: LifecycleState::Downloading,
            download_progress: 0.25,
            retry_count: 1,
            last_error: None,
            cache_path: None,
            size_bytes: None,
            added_at: Utc::now(),
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"downloading\""));
        // Optional fields skipped when None
        assert!(!json.contains("last_error"));
        assert!(!json.contains("cache_path"));
    }
}
