//! Clip scheduler.
//!
//! Each cycle loads the progress record, plans the next segment, extracts
//! and publishes it, and only then advances the cursor. A failed extract or
//! publish leaves the record untouched, so the same segment is attempted
//! again on the next cycle. Failing to persist an advance is fatal: carrying
//! on would re-publish the clip after a restart.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use clipcast_models::{caption, ProcessingProgress, PublishReceipt, Segment, SegmentPlanner, SourceVideo};
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::{RunMode, SchedulerConfig};
use crate::error::{FailureKind, WorkerError, WorkerResult};
use crate::logging::CycleLogger;
use crate::metrics;
use crate::pipeline::{ClipExtractor, ClipPublisher, SourceFetcher};
use crate::progress_store::ProgressStore;

#[cfg(test)]
mod tests;

/// Result of one scheduler cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The segment was published and the cursor advanced.
    Published {
        segment: Segment,
        progress: ProcessingProgress,
        receipt: PublishReceipt,
    },
    /// Nothing left to process.
    Done,
    /// The segment failed and will be retried; progress is unchanged.
    Failed {
        segment: Segment,
        kind: FailureKind,
        message: String,
    },
}

impl CycleOutcome {
    /// Whether the end of the video has been reached.
    pub fn is_done(&self) -> bool {
        match self {
            CycleOutcome::Done => true,
            CycleOutcome::Published { segment, .. } => !segment.has_more,
            CycleOutcome::Failed { .. } => false,
        }
    }
}

/// Totals for one `run`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub clips_published: u32,
    pub failed_cycles: u32,
    pub final_progress: ProcessingProgress,
    pub reached_end: bool,
}

/// Requests a running scheduler to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Signal shutdown. Waits are interrupted immediately; an in-flight
    /// cycle gets the configured grace period.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Everything a cycle needs, shared with the spawned cycle task.
struct CycleContext {
    planner: SegmentPlanner,
    source: SourceVideo,
    caption_tags: String,
    store: Arc<dyn ProgressStore>,
    extractor: Arc<dyn ClipExtractor>,
    publisher: Arc<dyn ClipPublisher>,
}

impl CycleContext {
    async fn run(&self) -> WorkerResult<CycleOutcome> {
        let progress = self.store.load().await;
        let video_end = self.source.video_end;

        if self.planner.is_complete(progress.cursor, video_end) {
            debug!(
                cursor = progress.cursor,
                video_end, "No segments remain, processing complete"
            );
            return Ok(CycleOutcome::Done);
        }

        let Some(segment) = self.planner.plan_next(progress.cursor, video_end) else {
            return Ok(CycleOutcome::Done);
        };

        let logger = CycleLogger::new(progress.next_sequence(), &segment);
        let span = logger.create_span();
        self.process_segment(&progress, segment, &logger)
            .instrument(span)
            .await
    }

    async fn process_segment(
        &self,
        progress: &ProcessingProgress,
        segment: Segment,
        logger: &CycleLogger,
    ) -> WorkerResult<CycleOutcome> {
        let sequence = logger.sequence();
        logger.log_start(&format!("processing clip {} {}", sequence, segment));

        let clip = match self
            .extractor
            .extract(&self.source.path, &segment, sequence)
            .await
        {
            Ok(clip) => clip,
            Err(e) => {
                let err = WorkerError::extraction(e);
                return Ok(failed(logger, segment, FailureKind::Extraction, &err));
            }
        };
        logger.log_progress(&format!(
            "extracted {} ({:.2}s)",
            clip.path.display(),
            clip.duration()
        ));

        let text = caption(sequence, segment.start, segment.end, &self.caption_tags);
        let receipt = match self.publisher.publish(&clip, &text).await {
            Ok(receipt) => receipt,
            Err(e) => {
                // Re-extracted on the next attempt
                remove_clip(logger, &clip.path).await;
                let err = WorkerError::from(e);
                return Ok(failed(logger, segment, FailureKind::Publish, &err));
            }
        };

        let next = progress.advanced_to(segment.end, Utc::now());
        if let Err(e) = self.store.save(&next).await {
            metrics::record_cycle_failure(FailureKind::Io);
            logger.log_failure(FailureKind::Io, &e.to_string());
            return Err(WorkerError::ProgressPersist(e));
        }
        metrics::record_clip_published();
        metrics::record_progress_cursor(next.cursor);

        remove_clip(logger, &clip.path).await;
        logger.log_completion(&format!(
            "published as {} ({} clips total)",
            receipt.media_id, next.clip_count
        ));

        Ok(CycleOutcome::Published {
            segment,
            progress: next,
            receipt,
        })
    }
}

fn failed(logger: &CycleLogger, segment: Segment, kind: FailureKind, err: &WorkerError) -> CycleOutcome {
    let message = err.to_string();
    logger.log_failure(kind, &message);
    metrics::record_cycle_failure(kind);
    CycleOutcome::Failed {
        segment,
        kind,
        message,
    }
}

async fn remove_clip(logger: &CycleLogger, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed local clip {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => logger.log_warning(&format!("could not remove {}: {}", path.display(), e)),
    }
}

/// Remove clip files left behind by an aborted cycle.
async fn sweep_clips(dir: &Path) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not read clips directory {}: {}", dir.display(), e);
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !is_clip_file(&path) {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!("Removed clip {} from aborted cycle", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}

fn is_clip_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.starts_with("clip_") && name.ends_with(".mp4")
}

/// Resolves once shutdown has been requested.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Drives the clip pipeline for one source video.
pub struct ClipScheduler {
    config: SchedulerConfig,
    planner: SegmentPlanner,
    store: Arc<dyn ProgressStore>,
    fetcher: Arc<dyn SourceFetcher>,
    extractor: Arc<dyn ClipExtractor>,
    publisher: Arc<dyn ClipPublisher>,
    shutdown: Arc<watch::Sender<bool>>,
    context: Option<Arc<CycleContext>>,
}

impl ClipScheduler {
    /// Create a scheduler. The configuration is validated here.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn ProgressStore>,
        fetcher: Arc<dyn SourceFetcher>,
        extractor: Arc<dyn ClipExtractor>,
        publisher: Arc<dyn ClipPublisher>,
    ) -> WorkerResult<Self> {
        config.validate()?;
        let planner = SegmentPlanner::new(config.video_start_time, config.clip_duration);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            planner,
            store,
            fetcher,
            extractor,
            publisher,
            shutdown: Arc::new(shutdown),
            context: None,
        })
    }

    /// Handle for stopping `run` from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }

    /// Resolve the source video and prepare the clips directory.
    ///
    /// The duration is probed once; `video_end` stays fixed for the run.
    pub async fn initialize(&mut self) -> WorkerResult<SourceVideo> {
        let dest = self.config.source_path();
        info!("Resolving source video {}", dest.display());

        let path = self
            .fetcher
            .fetch(&self.config.source_locator, &dest)
            .await
            .map_err(WorkerError::fetch)?;
        let duration = self
            .fetcher
            .probe_duration(&path)
            .await
            .map_err(WorkerError::fetch)?;

        let source = SourceVideo::new(&path, duration, self.config.video_end_time);
        tokio::fs::create_dir_all(&self.config.clips_dir).await?;

        info!(
            duration = source.duration,
            video_end = source.video_end,
            start = self.planner.start_time(),
            clip_duration = self.planner.clip_duration(),
            "Source video ready: {}",
            source.path.display()
        );
        if self.planner.start_time() >= source.video_end {
            warn!(
                "Configured start {}s is at or past the end of the video ({}s)",
                self.planner.start_time(),
                source.video_end
            );
        }

        self.context = Some(Arc::new(CycleContext {
            planner: self.planner,
            source: source.clone(),
            caption_tags: self.config.caption_tags.clone(),
            store: Arc::clone(&self.store),
            extractor: Arc::clone(&self.extractor),
            publisher: Arc::clone(&self.publisher),
        }));

        Ok(source)
    }

    fn context(&self) -> WorkerResult<Arc<CycleContext>> {
        self.context
            .clone()
            .ok_or_else(|| WorkerError::config_error("scheduler used before initialize"))
    }

    /// Run a single cycle on the current task.
    ///
    /// Extraction and publish failures are reported as
    /// [`CycleOutcome::Failed`]; only fatal errors are returned as `Err`.
    pub async fn run_cycle(&self) -> WorkerResult<CycleOutcome> {
        self.context()?.run().await
    }

    /// Run cycles until done (in `UntilDone` mode) or until stopped.
    ///
    /// The first cycle starts immediately. Initializes the scheduler first if
    /// that has not happened yet.
    pub async fn run(&mut self) -> WorkerResult<RunSummary> {
        if self.context.is_none() {
            self.initialize().await?;
        }
        let ctx = self.context()?;
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut summary = RunSummary::default();

        info!(mode = %self.config.run_mode, "Scheduler started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let started = Instant::now();
            let Some(outcome) = self.spawn_cycle(&ctx, &mut shutdown_rx).await? else {
                break;
            };
            metrics::record_cycle_duration(started.elapsed().as_secs_f64());

            match &outcome {
                CycleOutcome::Published { .. } => summary.clips_published += 1,
                CycleOutcome::Failed { .. } => summary.failed_cycles += 1,
                CycleOutcome::Done => {}
            }
            if outcome.is_done() {
                if !summary.reached_end {
                    info!("All segments processed");
                }
                summary.reached_end = true;
                if self.config.run_mode == RunMode::UntilDone {
                    break;
                }
            }

            if self.wait_for_next_cycle(&mut shutdown_rx).await {
                break;
            }
        }

        summary.final_progress = ctx.store.load().await;
        info!(
            clips_published = summary.clips_published,
            failed_cycles = summary.failed_cycles,
            cursor = summary.final_progress.cursor,
            "Scheduler stopped"
        );
        Ok(summary)
    }

    /// Run one cycle on its own task so a stop request is noticed mid-cycle.
    ///
    /// Returns `None` if the cycle had to be aborted after the grace period.
    async fn spawn_cycle(
        &self,
        ctx: &Arc<CycleContext>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> WorkerResult<Option<CycleOutcome>> {
        let task_ctx = Arc::clone(ctx);
        let mut task = tokio::spawn(async move { task_ctx.run().await });

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = stop_requested(shutdown_rx) => {
                let grace = self.config.shutdown_timeout;
                info!("Stop requested, waiting up to {:?} for the current cycle", grace);
                match tokio::time::timeout(grace, &mut task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!("Cycle did not finish within {:?}, aborting it", grace);
                        task.abort();
                        // Drops any running ffmpeg before its output is swept
                        let _ = (&mut task).await;
                        sweep_clips(&self.config.clips_dir).await;
                        return Ok(None);
                    }
                }
            }
        };

        match joined {
            Ok(Ok(outcome)) => Ok(Some(outcome)),
            Ok(Err(e)) => {
                error!("Fatal error, stopping scheduler: {}", e);
                Err(e)
            }
            Err(e) => Err(WorkerError::Task(e.to_string())),
        }
    }

    /// Sleep for the inter-cycle interval. Returns `true` if stopped.
    async fn wait_for_next_cycle(&self, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        let interval: Duration = self.config.inter_cycle_interval;
        debug!("Next cycle in {:?}", interval);

        tokio::select! {
            _ = tokio::time::sleep(interval) => false,
            _ = stop_requested(shutdown_rx) => {
                info!("Stop requested during wait");
                true
            }
        }
    }
}
