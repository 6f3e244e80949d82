use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clipcast_media::{MediaError, MediaResult};
use clipcast_models::{ExtractedClip, ProcessingProgress, PublishReceipt, Segment};
use clipcast_publish::{PublishError, PublishResult};
use tempfile::TempDir;

use super::*;
use crate::progress_store::JsonProgressStore;

struct FakeFetcher {
    duration: f64,
    fail: bool,
    fetches: AtomicU32,
}

impl FakeFetcher {
    fn new(duration: f64) -> Self {
        Self {
            duration,
            fail: false,
            fetches: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, _locator: &str, dest: &Path) -> MediaResult<PathBuf> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MediaError::invalid_source("returned a web page"));
        }
        Ok(dest.to_path_buf())
    }

    async fn probe_duration(&self, _source: &Path) -> MediaResult<f64> {
        Ok(self.duration)
    }
}

/// Writes a small file per clip; fails the first `fail_first` calls.
struct FakeExtractor {
    clips_dir: PathBuf,
    fail_first: u32,
    /// Hand out a non-empty directory, which `remove_file` cannot delete
    undeletable: bool,
    calls: Mutex<Vec<Segment>>,
}

impl FakeExtractor {
    fn new(clips_dir: &Path) -> Self {
        Self {
            clips_dir: clips_dir.to_path_buf(),
            fail_first: 0,
            undeletable: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn segments(&self) -> Vec<Segment> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipExtractor for FakeExtractor {
    async fn extract(
        &self,
        _source: &Path,
        segment: &Segment,
        sequence: u32,
    ) -> MediaResult<ExtractedClip> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(*segment);
            calls.len() as u32
        };
        if attempt <= self.fail_first {
            return Err(MediaError::ffmpeg_failed("encoder crashed", None, Some(1)));
        }

        let path = self.clips_dir.join(format!("clip_{:03}.mp4", sequence));
        if self.undeletable {
            tokio::fs::create_dir_all(&path).await?;
            tokio::fs::write(path.join("stream"), b"clip").await?;
        } else {
            tokio::fs::write(&path, b"clip").await?;
        }
        Ok(ExtractedClip {
            path,
            sequence,
            start: segment.start,
            end: segment.end,
        })
    }
}

struct FakePublisher {
    fail: bool,
    delay: Duration,
    captions: Mutex<Vec<String>>,
    clip_paths: Mutex<Vec<PathBuf>>,
}

impl FakePublisher {
    fn new() -> Self {
        Self {
            fail: false,
            delay: Duration::ZERO,
            captions: Mutex::new(Vec::new()),
            clip_paths: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.captions.lock().unwrap().len()
    }
}

#[async_trait]
impl ClipPublisher for FakePublisher {
    async fn publish(&self, clip: &ExtractedClip, caption: &str) -> PublishResult<PublishReceipt> {
        self.captions.lock().unwrap().push(caption.to_string());
        self.clip_paths.lock().unwrap().push(clip.path.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(PublishError::ProcessingFailed("ERROR".to_string()));
        }
        Ok(PublishReceipt {
            media_id: format!("media-{}", clip.sequence),
            media_url: None,
        })
    }
}

/// Loads fine, never saves.
struct ReadOnlyStore;

#[async_trait]
impl ProgressStore for ReadOnlyStore {
    async fn load(&self) -> ProcessingProgress {
        ProcessingProgress::default()
    }

    async fn save(&self, _progress: &ProcessingProgress) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only medium"))
    }
}

struct Harness {
    dir: TempDir,
    config: SchedulerConfig,
    store: Arc<JsonProgressStore>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = SchedulerConfig {
            source_locator: "https://drive.google.com/file/d/abc/view".to_string(),
            clip_duration: 60.0,
            inter_cycle_interval: Duration::ZERO,
            download_dir: dir.path().join("downloads"),
            clips_dir: dir.path().join("clips"),
            state_file: dir.path().join("processing_state.json"),
            run_mode: RunMode::UntilDone,
            shutdown_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let store = Arc::new(JsonProgressStore::new(config.state_file.clone()));
        Self { dir, config, store }
    }

    fn clips_dir(&self) -> PathBuf {
        self.dir.path().join("clips")
    }

    fn scheduler(
        &self,
        fetcher: Arc<FakeFetcher>,
        extractor: Arc<FakeExtractor>,
        publisher: Arc<FakePublisher>,
    ) -> ClipScheduler {
        ClipScheduler::new(
            self.config.clone(),
            self.store.clone(),
            fetcher,
            extractor,
            publisher,
        )
        .unwrap()
    }
}

fn clip_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn test_progress_advances_through_whole_video() {
    let harness = Harness::new();
    let extractor = Arc::new(FakeExtractor::new(&harness.clips_dir()));
    let publisher = Arc::new(FakePublisher::new());
    let mut scheduler = harness.scheduler(
        Arc::new(FakeFetcher::new(185.0)),
        extractor.clone(),
        publisher.clone(),
    );

    let summary = scheduler.run().await.unwrap();

    assert_eq!(summary.clips_published, 4);
    assert_eq!(summary.failed_cycles, 0);
    assert!(summary.reached_end);
    assert_eq!(summary.final_progress.cursor, 185.0);
    assert_eq!(summary.final_progress.clip_count, 4);
    assert!(summary.final_progress.last_processed_at.is_some());

    let segments = extractor.segments();
    let ranges: Vec<_> = segments.iter().map(|s| (s.start, s.end, s.has_more)).collect();
    assert_eq!(
        ranges,
        vec![
            (0.0, 60.0, true),
            (60.0, 120.0, true),
            (120.0, 180.0, true),
            (180.0, 185.0, false),
        ]
    );

    // Local clips are cleaned up after a confirmed publish
    assert_eq!(clip_files(&harness.clips_dir()), 0);
}

#[tokio::test]
async fn test_cycle_outcomes_report_each_step() {
    let harness = Harness::new();
    let publisher = Arc::new(FakePublisher::new());
    let mut scheduler = harness.scheduler(
        Arc::new(FakeFetcher::new(185.0)),
        Arc::new(FakeExtractor::new(&harness.clips_dir())),
        publisher.clone(),
    );
    scheduler.initialize().await.unwrap();

    let outcome = scheduler.run_cycle().await.unwrap();
    match outcome {
        CycleOutcome::Published {
            segment,
            progress,
            receipt,
        } => {
            assert_eq!((segment.start, segment.end), (0.0, 60.0));
            assert_eq!(progress.cursor, 60.0);
            assert_eq!(progress.clip_count, 1);
            assert_eq!(receipt.media_id, "media-1");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(
        publisher.captions.lock().unwrap()[0],
        "Video clip 1 (0s - 60s) #video #content"
    );
}

#[tokio::test]
async fn test_publish_failure_never_moves_progress() {
    let harness = Harness::new();
    let extractor = Arc::new(FakeExtractor::new(&harness.clips_dir()));
    let publisher = Arc::new(FakePublisher::failing());
    let mut scheduler = harness.scheduler(
        Arc::new(FakeFetcher::new(185.0)),
        extractor.clone(),
        publisher.clone(),
    );
    scheduler.initialize().await.unwrap();

    for _ in 0..3 {
        let outcome = scheduler.run_cycle().await.unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Failed {
                kind: FailureKind::Publish,
                ..
            }
        ));
    }

    let progress = harness.store.load().await;
    assert_eq!(progress, ProcessingProgress::default());

    // Same segment every time, and the failed clip is deleted for re-extraction
    let segments = extractor.segments();
    assert_eq!(segments.len(), 3);
    assert!(segments.iter().all(|s| s.start == 0.0 && s.end == 60.0));
    assert_eq!(publisher.calls(), 3);
    assert_eq!(clip_files(&harness.clips_dir()), 0);
}

#[tokio::test]
async fn test_extraction_failure_retries_same_segment() {
    let harness = Harness::new();
    let extractor = Arc::new(FakeExtractor {
        fail_first: 1,
        ..FakeExtractor::new(&harness.clips_dir())
    });
    let publisher = Arc::new(FakePublisher::new());
    let mut scheduler = harness.scheduler(
        Arc::new(FakeFetcher::new(185.0)),
        extractor.clone(),
        publisher.clone(),
    );
    scheduler.initialize().await.unwrap();

    let first = scheduler.run_cycle().await.unwrap();
    assert!(matches!(
        first,
        CycleOutcome::Failed {
            kind: FailureKind::Extraction,
            ..
        }
    ));
    assert_eq!(publisher.calls(), 0);
    assert_eq!(harness.store.load().await.cursor, 0.0);

    let second = scheduler.run_cycle().await.unwrap();
    assert!(matches!(second, CycleOutcome::Published { .. }));

    let segments = extractor.segments();
    assert_eq!(segments[0], segments[1]);
    assert_eq!(harness.store.load().await.cursor, 60.0);
}

#[tokio::test]
async fn test_completed_video_invokes_no_adapters() {
    let harness = Harness::new();
    harness
        .store
        .save(&ProcessingProgress {
            cursor: 185.0,
            clip_count: 4,
            last_processed_at: None,
        })
        .await
        .unwrap();

    let extractor = Arc::new(FakeExtractor::new(&harness.clips_dir()));
    let publisher = Arc::new(FakePublisher::new());
    let mut scheduler = harness.scheduler(
        Arc::new(FakeFetcher::new(185.0)),
        extractor.clone(),
        publisher.clone(),
    );
    scheduler.initialize().await.unwrap();

    assert_eq!(scheduler.run_cycle().await.unwrap(), CycleOutcome::Done);
    assert_eq!(scheduler.run_cycle().await.unwrap(), CycleOutcome::Done);
    assert!(extractor.segments().is_empty());
    assert_eq!(publisher.calls(), 0);

    let summary = scheduler.run().await.unwrap();
    assert_eq!(summary.clips_published, 0);
    assert!(summary.reached_end);
    assert_eq!(summary.final_progress.clip_count, 4);
}

#[tokio::test]
async fn test_persist_failure_is_fatal() {
    let harness = Harness::new();
    let publisher = Arc::new(FakePublisher::new());
    let mut scheduler = ClipScheduler::new(
        harness.config.clone(),
        Arc::new(ReadOnlyStore),
        Arc::new(FakeFetcher::new(185.0)),
        Arc::new(FakeExtractor::new(&harness.clips_dir())),
        publisher.clone(),
    )
    .unwrap();

    let err = scheduler.run().await.unwrap_err();

    assert!(matches!(err, WorkerError::ProgressPersist(_)));
    assert_eq!(err.kind(), Some(FailureKind::Io));
    assert!(err.is_fatal());
    // Aborted after the first publish rather than moving on
    assert_eq!(publisher.calls(), 1);
}

#[tokio::test]
async fn test_fetch_failure_aborts_initialization() {
    let harness = Harness::new();
    let fetcher = Arc::new(FakeFetcher {
        fail: true,
        ..FakeFetcher::new(185.0)
    });
    let extractor = Arc::new(FakeExtractor::new(&harness.clips_dir()));
    let mut scheduler = harness.scheduler(fetcher, extractor.clone(), Arc::new(FakePublisher::new()));

    let err = scheduler.run().await.unwrap_err();
    assert_eq!(err.kind(), Some(FailureKind::Fetch));
    assert!(extractor.segments().is_empty());
}

#[tokio::test]
async fn test_run_cycle_requires_initialize() {
    let harness = Harness::new();
    let scheduler = harness.scheduler(
        Arc::new(FakeFetcher::new(185.0)),
        Arc::new(FakeExtractor::new(&harness.clips_dir())),
        Arc::new(FakePublisher::new()),
    );
    assert!(matches!(
        scheduler.run_cycle().await,
        Err(WorkerError::Config(_))
    ));
}

#[tokio::test]
async fn test_configured_window_bounds_segments() {
    let mut harness = Harness::new();
    harness.config.video_start_time = 100.0;
    harness.config.video_end_time = Some(170.0);

    let extractor = Arc::new(FakeExtractor::new(&harness.clips_dir()));
    let fetcher = Arc::new(FakeFetcher::new(185.0));
    let mut scheduler = harness.scheduler(
        fetcher.clone(),
        extractor.clone(),
        Arc::new(FakePublisher::new()),
    );

    let source = scheduler.initialize().await.unwrap();
    assert_eq!(source.video_end, 170.0);
    assert_eq!(source.duration, 185.0);

    let summary = scheduler.run().await.unwrap();
    assert_eq!(summary.clips_published, 2);
    assert_eq!(summary.final_progress.cursor, 170.0);
    assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);

    let ranges: Vec<_> = extractor
        .segments()
        .iter()
        .map(|s| (s.start, s.end))
        .collect();
    assert_eq!(ranges, vec![(100.0, 160.0), (160.0, 170.0)]);
}

#[tokio::test]
async fn test_stop_interrupts_inter_cycle_wait() {
    let mut harness = Harness::new();
    harness.config.run_mode = RunMode::Continuous;
    harness.config.inter_cycle_interval = Duration::from_secs(3600);

    let publisher = Arc::new(FakePublisher::new());
    let mut scheduler = harness.scheduler(
        Arc::new(FakeFetcher::new(185.0)),
        Arc::new(FakeExtractor::new(&harness.clips_dir())),
        publisher.clone(),
    );
    let handle = scheduler.shutdown_handle();
    let run = tokio::spawn(async move { scheduler.run().await });

    // First cycle runs immediately, then the scheduler sleeps for an hour
    for _ in 0..200 {
        if publisher.calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(publisher.calls(), 1);

    handle.shutdown();
    assert!(handle.is_shutdown());

    let summary = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("scheduler did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(summary.clips_published, 1);
    assert!(!summary.reached_end);
    assert_eq!(summary.final_progress.cursor, 60.0);
}

#[tokio::test]
async fn test_stop_aborts_cycle_after_grace_period() {
    let mut harness = Harness::new();
    harness.config.shutdown_timeout = Duration::from_millis(50);

    let publisher = Arc::new(FakePublisher {
        delay: Duration::from_secs(3600),
        ..FakePublisher::new()
    });
    let mut scheduler = harness.scheduler(
        Arc::new(FakeFetcher::new(185.0)),
        Arc::new(FakeExtractor::new(&harness.clips_dir())),
        publisher.clone(),
    );
    let handle = scheduler.shutdown_handle();
    let run = tokio::spawn(async move { scheduler.run().await });

    for _ in 0..200 {
        if publisher.calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.shutdown();

    let summary = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("scheduler did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(summary.clips_published, 0);
    assert_eq!(summary.final_progress, ProcessingProgress::default());
    assert_eq!(clip_files(&harness.clips_dir()), 0);
}

#[tokio::test]
async fn test_failed_clip_cleanup_does_not_block_commit() {
    let harness = Harness::new();
    let extractor = Arc::new(FakeExtractor {
        undeletable: true,
        ..FakeExtractor::new(&harness.clips_dir())
    });
    let publisher = Arc::new(FakePublisher::new());
    let mut scheduler = harness.scheduler(
        Arc::new(FakeFetcher::new(185.0)),
        extractor,
        publisher.clone(),
    );
    scheduler.initialize().await.unwrap();

    let outcome = scheduler.run_cycle().await.unwrap();

    match outcome {
        CycleOutcome::Published { progress, receipt, .. } => {
            assert_eq!(progress.cursor, 60.0);
            assert_eq!(progress.clip_count, 1);
            assert_eq!(receipt.media_id, "media-1");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(harness.store.load().await.cursor, 60.0);
    assert!(harness.clips_dir().join("clip_001.mp4").is_dir());

    // The next cycle moves on rather than re-publishing
    let outcome = scheduler.run_cycle().await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Published { segment, .. } if segment.start == 60.0));
    assert_eq!(publisher.calls(), 2);
}

#[tokio::test]
async fn test_continuous_mode_keeps_cycling_after_done() {
    let mut harness = Harness::new();
    harness.config.run_mode = RunMode::Continuous;
    harness.config.inter_cycle_interval = Duration::from_millis(5);

    let publisher = Arc::new(FakePublisher::new());
    let mut scheduler = harness.scheduler(
        Arc::new(FakeFetcher::new(120.0)),
        Arc::new(FakeExtractor::new(&harness.clips_dir())),
        publisher.clone(),
    );
    let handle = scheduler.shutdown_handle();
    let run = tokio::spawn(async move { scheduler.run().await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.shutdown();

    let summary = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("scheduler did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(summary.clips_published, 2);
    assert!(summary.reached_end);
    assert_eq!(publisher.calls(), 2);
    assert_eq!(summary.final_progress.cursor, 120.0);
}
