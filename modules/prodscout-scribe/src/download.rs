//! Media acquisition via the external downloader tool (yt-dlp).

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, ScribeError};
use crate::video;

const DOWNLOADER: &str = "yt-dlp";

/// Download the audio-only stream of a video into `out_dir`. Returns the
/// path to the audio file.
pub async fn download_audio(url: &str, out_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(out_dir).await?;
    let template = out_dir.join("audio.%(ext)s");

    info!(url, "Downloading audio stream");
    let output = Command::new(DOWNLOADER)
        .arg("-x")
        .arg("--audio-format")
        .arg("m4a")
        .arg("--no-playlist")
        .arg("--output")
        .arg(&template)
        .arg(url)
        .output()
        .await
        .map_err(|e| ScribeError::Download(format!("{DOWNLOADER} not runnable: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("audio codec") || stderr.contains("no audio") {
            return Err(ScribeError::Silent);
        }
        let tail: String = stderr.chars().rev().take(300).collect::<String>();
        let tail: String = tail.chars().rev().collect();
        return Err(ScribeError::Download(tail));
    }

    find_file(out_dir, "audio.", None)
        .await?
        .ok_or_else(|| ScribeError::Download("downloader produced no audio file".into()))
}

/// Try to fetch an existing subtitle track (manual first, then
/// auto-generated) for a platform video. `Ok(None)` means no track is
/// available; ASR should run instead.
pub async fn download_platform_subtitles(
    url: &str,
    out_dir: &Path,
    lang: &str,
) -> Result<Option<PathBuf>> {
    if video::platform_video_id(url).is_none() {
        return Ok(None);
    }
    tokio::fs::create_dir_all(out_dir).await?;

    // Clear leftovers so a stale track is never picked up.
    remove_matching(out_dir, "ytsub_temp.").await;

    let template = out_dir.join("ytsub_temp.%(ext)s");
    debug!(url, lang, "Probing for existing subtitle track");
    let output = Command::new(DOWNLOADER)
        .arg("--skip-download")
        .arg("--write-subs")
        .arg("--write-auto-subs")
        .arg("--sub-lang")
        .arg(lang)
        .arg("--sub-format")
        .arg("vtt")
        .arg("--output")
        .arg(&template)
        .arg(url)
        .output()
        .await
        .map_err(|e| ScribeError::Download(format!("{DOWNLOADER} not runnable: {e}")))?;

    if !output.status.success() {
        warn!(url, "Subtitle probe failed, falling back to ASR");
        return Ok(None);
    }

    find_file(out_dir, "ytsub_temp.", Some("vtt")).await
}

async fn find_file(dir: &Path, prefix: &str, extension: Option<&str>) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let ext_ok = extension.map_or(true, |ext| name.ends_with(&format!(".{ext}")));
        if name.starts_with(prefix) && ext_ok {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

async fn remove_matching(dir: &Path, prefix: &str) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(prefix) {
            let _ = tokio::fs::remove_file(entry.path()).await;
        }
    }
}
