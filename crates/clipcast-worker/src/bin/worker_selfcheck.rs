use std::path::Path;

use clipcast_media::{check_ffmpeg, check_ffprobe};
use clipcast_worker::SchedulerConfig;

const REQUIRED_ENV: &[&str] = &[
    "CLIPCAST_SOURCE_URL",
    "CLOUDINARY_CLOUD_NAME",
    "CLOUDINARY_API_KEY",
    "CLOUDINARY_API_SECRET",
    "INSTAGRAM_ACCESS_TOKEN",
    "INSTAGRAM_USER_ID",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    ensure_env_present(REQUIRED_ENV)?;
    let config = SchedulerConfig::from_env()?;

    println!(
        "worker-selfcheck: starting with download_dir={} clips_dir={} state_file={}",
        config.download_dir.display(),
        config.clips_dir.display(),
        config.state_file.display()
    );

    ensure_dir_writable(&config.download_dir).await?;
    ensure_dir_writable(&config.clips_dir).await?;
    if let Some(parent) = config.state_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir_writable(parent).await?;
    }

    let ffmpeg = check_ffmpeg()?;
    let ffprobe = check_ffprobe()?;
    println!(
        "worker-selfcheck: ffmpeg={} ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir_writable<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;

    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok")
        .await
        .map_err(|e| anyhow::anyhow!("{} is not writable: {}", path.display(), e))?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    let missing: Vec<_> = vars
        .iter()
        .filter(|var| std::env::var(var).map(|v| v.trim().is_empty()).unwrap_or(true))
        .collect();

    if !missing.is_empty() {
        return Err(anyhow::anyhow!(
            "missing required env vars: {}",
            missing.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ")
        ));
    }
    Ok(())
}
