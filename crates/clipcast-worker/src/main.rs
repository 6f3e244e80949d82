//! Clip scheduler worker binary.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipcast_media::SourceDownloader;
use clipcast_worker::{
    ClipScheduler, FfmpegExtractor, JsonProgressStore, MediaSourceFetcher, SchedulerConfig,
    SocialPublisher,
};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("clipcast=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting clipcast-worker");

    install_metrics_exporter();

    // Load configuration
    let config = match SchedulerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Scheduler config: {:?}", config);

    let downloader = match SourceDownloader::new() {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to create source downloader: {}", e);
            std::process::exit(1);
        }
    };

    let publisher = match SocialPublisher::from_env() {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to configure publisher: {}", e);
            std::process::exit(1);
        }
    };

    let scheduler = ClipScheduler::new(
        config.clone(),
        Arc::new(JsonProgressStore::new(config.state_file.clone())),
        Arc::new(MediaSourceFetcher::new(downloader)),
        Arc::new(FfmpegExtractor::new(config.clips_dir.clone(), config.extract_timeout)),
        Arc::new(publisher),
    );
    let mut scheduler = match scheduler {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create scheduler: {}", e);
            std::process::exit(1);
        }
    };

    // Setup signal handler
    let shutdown = scheduler.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            shutdown.shutdown();
        }
    });

    match scheduler.run().await {
        Ok(summary) => {
            info!(
                clips_published = summary.clips_published,
                failed_cycles = summary.failed_cycles,
                cursor = summary.final_progress.cursor,
                clip_count = summary.final_progress.clip_count,
                reached_end = summary.reached_end,
                "Worker shutdown complete"
            );
        }
        Err(e) => {
            error!("Scheduler error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Serve Prometheus metrics when `METRICS_ADDR` is set.
fn install_metrics_exporter() {
    let Ok(addr) = std::env::var("METRICS_ADDR") else {
        return;
    };

    let addr: SocketAddr = match addr.parse() {
        Ok(a) => a,
        Err(e) => {
            warn!("Ignoring invalid METRICS_ADDR '{}': {}", addr, e);
            return;
        }
    };

    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => info!("Metrics exporter listening on {}", addr),
        Err(e) => warn!("Failed to install metrics exporter: {}", e),
    }
}
