//! File-backed checkpoint store.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use phenolink_core::{CheckpointStore, Error, PipelineCheckpoint, Result};

/// Persists the checkpoint as a small JSON file.
///
/// Writes go to a temporary sibling file first and are renamed into place,
/// so a crash mid-write never leaves a torn checkpoint. Offsets must be
/// monotonically non-decreasing within a run.
pub struct FileCheckpointStore {
    path: PathBuf,
    /// Highest offset saved by this store instance.
    last_saved: Mutex<Option<u64>>,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_saved: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<Option<PipelineCheckpoint>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No checkpoint on disk, starting fresh");
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Checkpoint(format!("{}: {}", self.path.display(), e)))?;
        let checkpoint: PipelineCheckpoint = serde_json::from_str(&content)
            .map_err(|e| Error::Checkpoint(format!("{}: {}", self.path.display(), e)))?;

        info!(
            row_offset = checkpoint.row_offset,
            "Loaded checkpoint, run will resume"
        );
        Ok(Some(checkpoint))
    }

    async fn save(&self, checkpoint: &PipelineCheckpoint) -> Result<()> {
        {
            let mut last = self.last_saved.lock().expect("checkpoint lock poisoned");
            if let Some(prev) = *last {
                if checkpoint.row_offset < prev {
                    return Err(Error::Checkpoint(format!(
                        "offset moved backwards: {} -> {}",
                        prev, checkpoint.row_offset
                    )));
                }
            }
            *last = Some(checkpoint.row_offset);
        }

        let json = serde_json::to_string_pretty(checkpoint)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| Error::Checkpoint(format!("{}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| Error::Checkpoint(format!("{}: {}", self.path.display(), e)))?;

        debug!(row_offset = checkpoint.row_offset, "Checkpoint saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phenolink_core::RunCounts;

    fn checkpoint(offset: u64) -> PipelineCheckpoint {
        PipelineCheckpoint::new(offset, RunCounts::default())
    }

    #[tokio::test]
    async fn missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));

        let mut counts = RunCounts::default();
        counts.accepted = 42;
        let cp = PipelineCheckpoint::new(500, counts);
        store.save(&cp).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.row_offset, 500);
        assert_eq!(loaded.counts.accepted, 42);
    }

    #[tokio::test]
    async fn later_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));

        store.save(&checkpoint(50)).await.unwrap();
        store.save(&checkpoint(100)).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.row_offset, 100);
    }

    #[tokio::test]
    async fn equal_offset_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));
        store.save(&checkpoint(50)).await.unwrap();
        store.save(&checkpoint(50)).await.unwrap();
    }

    #[tokio::test]
    async fn backwards_offset_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));

        store.save(&checkpoint(100)).await.unwrap();
        let err = store.save(&checkpoint(99)).await.unwrap_err();
        assert!(matches!(err, Error::Checkpoint(_)));

        // The earlier checkpoint is untouched.
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.row_offset, 100);
    }

    #[tokio::test]
    async fn malformed_file_is_a_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileCheckpointStore::new(path);
        assert!(matches!(store.load().await, Err(Error::Checkpoint(_))));
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let store = FileCheckpointStore::new(&path);
        store.save(&checkpoint(10)).await.unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }
}
