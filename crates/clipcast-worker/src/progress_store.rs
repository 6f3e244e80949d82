//! Durable progress storage.
//!
//! The progress record is rewritten in full on every save: serialized to a
//! temporary file in the same directory, fsynced, then renamed over the
//! target. A reader therefore sees either the old record or the new one,
//! never a mix, and a crash mid-write leaves at most a stray temp file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clipcast_models::ProcessingProgress;
use tracing::{debug, warn};

/// Storage for the scheduler's progress record.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Load the persisted progress.
    ///
    /// Missing, unreadable or corrupt records yield the zero-value default.
    async fn load(&self) -> ProcessingProgress;

    /// Durably replace the persisted progress.
    async fn save(&self, progress: &ProcessingProgress) -> io::Result<()>;
}

/// Progress record kept as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct JsonProgressStore {
    path: PathBuf,
}

impl JsonProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProgressStore for JsonProgressStore {
    async fn load(&self) -> ProcessingProgress {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No progress record at {}, starting fresh", self.path.display());
                return ProcessingProgress::default();
            }
            Err(e) => {
                warn!(
                    "Could not read progress record {}: {}, starting fresh",
                    self.path.display(),
                    e
                );
                return ProcessingProgress::default();
            }
        };

        match serde_json::from_str::<ProcessingProgress>(&raw) {
            Ok(progress) if progress.is_valid() => progress,
            Ok(progress) => {
                warn!(
                    cursor = progress.cursor,
                    "Progress record {} has an invalid cursor, starting fresh",
                    self.path.display()
                );
                ProcessingProgress::default()
            }
            Err(e) => {
                warn!(
                    "Progress record {} is corrupt: {}, starting fresh",
                    self.path.display(),
                    e
                );
                ProcessingProgress::default()
            }
        }
    }

    async fn save(&self, progress: &ProcessingProgress) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(progress).map_err(io::Error::other)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(io::Error::other)??;

        debug!(
            cursor = progress.cursor,
            clip_count = progress.clip_count,
            "Progress saved to {}",
            self.path.display()
        );
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let prefix = format!(
        ".{}.",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "progress".to_string())
    );
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(&dir)?;

    tmp.write_all(contents)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // The record is already in place; only its durability is in doubt
    if let Err(e) = sync_dir(&dir) {
        warn!("Could not sync directory {}: {}", dir.display(), e);
    }
    Ok(())
}

/// Make the rename itself durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn store_in(dir: &tempfile::TempDir) -> JsonProgressStore {
        JsonProgressStore::new(dir.path().join("processing_state.json"))
    }

    #[tokio::test]
    async fn test_load_missing_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let progress = store_in(&dir).load().await;
        assert_eq!(progress, ProcessingProgress::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let progress = ProcessingProgress::default().advanced_to(60.0, at);

        store.save(&progress).await.unwrap();
        assert_eq!(store.load().await, progress);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let fields: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(value["current_position"], 60.0);
        assert_eq!(value["clip_count"], 1);
        assert!(value["last_processed"].is_string());
    }

    #[tokio::test]
    async fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProgressStore::new(dir.path().join("state").join("progress.json"));
        store.save(&ProcessingProgress::starting_at(30.0)).await.unwrap();
        assert_eq!(store.load().await.cursor, 30.0);
    }

    #[tokio::test]
    async fn test_corrupt_record_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{\"current_position\": 12.5, \"clip_co").unwrap();
        assert_eq!(store.load().await, ProcessingProgress::default());
    }

    #[tokio::test]
    async fn test_negative_cursor_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"current_position": -5.0, "clip_count": 2, "last_processed": null}"#,
        )
        .unwrap();
        assert_eq!(store.load().await, ProcessingProgress::default());
    }

    #[tokio::test]
    async fn test_leftover_temp_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let committed = ProcessingProgress::default().advanced_to(120.0, Utc::now());
        store.save(&committed).await.unwrap();

        // A write that crashed before its rename
        std::fs::write(
            dir.path().join(".processing_state.json.abc123.tmp"),
            "{\"current_position\": 180",
        )
        .unwrap();

        assert_eq!(store.load().await, committed);

        let next = committed.advanced_to(180.0, Utc::now());
        store.save(&next).await.unwrap();
        assert_eq!(store.load().await, next);
    }

    #[tokio::test]
    async fn test_save_to_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "file").unwrap();

        let store = JsonProgressStore::new(blocker.join("processing_state.json"));
        let result = store.save(&ProcessingProgress::default()).await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_dir_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        assert!(sync_dir(dir.path()).is_ok());

        let err = sync_dir(&dir.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_reads_legacy_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"current_position": 240, "clip_count": 4, "last_processed": "2024-03-02T10:15:30.123456"}"#,
        )
        .unwrap();

        let progress = store.load().await;
        assert_eq!(progress.cursor, 240.0);
        assert_eq!(progress.clip_count, 4);
        assert!(progress.last_processed_at.is_some());
    }
}
