//! Media download and post-download library synchronization
//!
//! The fetch itself is delegated to a `MediaFetcher`; production uses
//! yt-dlp as a subprocess. A download is successful once the file is on
//! disk and the video row is marked `downloaded` — the library sync that
//! follows is best-effort and can never fail the task.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::db::{Database, PerformerRecord, VideoRecord, VideoStatus};
use crate::services::library::{JOB_WAIT_TIMEOUT, LibraryClient, SceneUpdate};
use crate::sources::ProgressSink;

/// Where one performer's files land under a site's download root
pub fn performer_dir(base: &str, performer_name: &str) -> PathBuf {
    Path::new(base).join(sanitize_filename::sanitize(performer_name))
}

/// Fetches a single video's media into a directory
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download `url` into `dest_dir` under `file_stem` (extension chosen by
    /// the fetcher). Returns the path of the produced file.
    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        file_stem: &str,
        cookies: Option<&Path>,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf>;
}

/// Production fetcher shelling out to yt-dlp
pub struct YtDlpFetcher {
    binary: String,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
        }
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        file_stem: &str,
        cookies: Option<&Path>,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        let template = dest_dir.join(format!("{}.%(ext)s", file_stem));

        let mut command = Command::new(&self.binary);
        command
            .arg("--newline")
            .arg("--no-playlist")
            .arg("-o")
            .arg(&template)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cookies) = cookies {
            command.arg("--cookies").arg(cookies);
        }
        command.arg(url);

        debug!(url, dest = %dest_dir.display(), "Spawning yt-dlp");
        let mut child = command.spawn().context("Failed to spawn yt-dlp")?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some((done, total)) = parse_progress_line(&line) {
                    progress.bytes(done, total);
                }
            }
        }

        let output = child
            .wait_with_output()
            .await
            .context("yt-dlp did not exit cleanly")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.lines().last().unwrap_or("no output")
            );
        }

        find_output_file(dest_dir, file_stem)
            .with_context(|| format!("yt-dlp reported success but no file matches '{}'", file_stem))
    }
}

/// Parse a `[download]  42.5% of 10.50MiB at ...` line into byte counters
fn parse_progress_line(line: &str) -> Option<(u64, Option<u64>)> {
    let rest = line.strip_prefix("[download]")?.trim_start();
    let (percent_str, rest) = rest.split_once('%')?;
    let percent: f64 = percent_str.trim().parse().ok()?;

    let total = rest
        .trim_start()
        .strip_prefix("of ")
        .and_then(|r| r.split_whitespace().next())
        .and_then(parse_size);

    let done = total.map(|t| (t as f64 * percent / 100.0) as u64)?;
    Some((done, total))
}

/// "10.50MiB" and friends into bytes
fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim_start_matches('~');
    let unit_at = s.find(|c: char| c.is_ascii_alphabetic())?;
    let value: f64 = s[..unit_at].parse().ok()?;
    let multiplier: f64 = match &s[unit_at..] {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}

fn find_output_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(stem))
        })
}

/// Download one video and reconcile its state.
///
/// Fatal only up to the `downloaded` mark; everything after (library scan,
/// scene tagging) is logged and swallowed.
pub async fn download_video(
    db: &Database,
    fetcher: &dyn MediaFetcher,
    video_id: i64,
    cookies_path: &Path,
    progress: &dyn ProgressSink,
) -> Result<Value> {
    let video = db
        .videos()
        .get(video_id)
        .await?
        .with_context(|| format!("Video {} not found", video_id))?;
    let performer = db
        .performers()
        .get(&video.performer_id)
        .await?
        .with_context(|| format!("Performer {} not found", video.performer_id))?;

    let settings = db.settings();
    let base = settings
        .download_path_for(performer.site.as_str())
        .await?
        .context("Download path not configured")?;
    let dest_dir = performer_dir(&base, &performer.name);
    tokio::fs::create_dir_all(&dest_dir)
        .await
        .with_context(|| format!("Failed to create {}", dest_dir.display()))?;

    let file_stem = sanitize_filename::sanitize(format!("{} [{}]", video.title, video.viewkey));
    progress.progress(10, format!("Downloading {}", video.title));

    let cookies = performer.use_auth_session.then_some(cookies_path);
    let path = fetcher
        .fetch(&video.url, &dest_dir, &file_stem, cookies, progress)
        .await?;
    info!(video_id, path = %path.display(), "Download finished");

    // The download is complete from here on, whatever the library says
    db.videos().set_status(video_id, VideoStatus::Downloaded).await?;
    progress.progress(80, "Syncing to library".to_string());

    if let Err(e) = sync_to_library(db, &performer, &video, &path).await {
        warn!(video_id, error = %e, "Library sync failed; download kept");
    }

    progress.progress(100, "Done".to_string());
    Ok(json!({
        "video_id": video_id,
        "path": path.to_string_lossy(),
    }))
}

/// Push the finished download into the external library: trigger a scan of
/// the directory, wait (bounded) for it, then tag the resulting scene.
async fn sync_to_library(
    db: &Database,
    performer: &PerformerRecord,
    video: &VideoRecord,
    path: &Path,
) -> Result<()> {
    let settings = db.settings();
    let Some(library) = LibraryClient::from_settings(&settings).await? else {
        return Ok(());
    };

    let dir = path.parent().unwrap_or(path);
    if let Some(job_id) = library.metadata_scan(&dir.to_string_lossy()).await {
        library.wait_for_job(&job_id, JOB_WAIT_TIMEOUT).await;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Some(scene_id) = library.find_scene_by_path(&file_name).await else {
        debug!(video_id = video.id, "Scene not indexed yet; skipping tag");
        return Ok(());
    };

    let performer_ids = match library.find_performer(&performer.name).await {
        Some(id) => vec![id],
        None => Vec::new(),
    };
    let update = SceneUpdate {
        title: Some(video.title.clone()),
        url: Some(video.url.clone()),
        date: video.published.clone(),
        details: None,
        performer_ids,
    };
    if !library.update_scene(&scene_id, update).await {
        anyhow::bail!("Scene update rejected");
    }
    info!(video_id = video.id, scene_id, "Library scene tagged");
    Ok(())
}
