//! Proxy stage: thumbnail and keyframe generation.
//!
//! Uses FFmpeg when it is installed. When it is not, or when extraction
//! fails on the given media, the stage falls back to a lightweight
//! placeholder proxy so ingestion keeps moving; the proxy is a preview
//! artifact and never gates recall eligibility.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

use shotlist_core::{defaults, AssetRepository, Error, Result, StageKind};

use crate::handler::{StageContext, StageHandler, StageOutcome};

/// How many bytes of the source go into a placeholder thumbnail.
const PLACEHOLDER_THUMB_BYTES: usize = 4096;

pub struct ProxyStage<A: AssetRepository> {
    assets: Arc<A>,
    output_dir: PathBuf,
    keyframe_interval_secs: f64,
    cmd_timeout_secs: u64,
}

impl<A: AssetRepository> ProxyStage<A> {
    pub fn new(assets: Arc<A>) -> Self {
        Self {
            assets,
            output_dir: std::env::temp_dir().join("shotlist-proxy"),
            keyframe_interval_secs: defaults::KEYFRAME_INTERVAL_SECS,
            cmd_timeout_secs: defaults::STAGE_TIMEOUT_SECS,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_keyframe_interval(mut self, secs: f64) -> Self {
        self.keyframe_interval_secs = secs;
        self
    }

    async fn write_thumbnail(&self, ctx: &StageContext, path: &PathBuf) -> Result<()> {
        if ctx.asset.mime_type.starts_with("video/") && ffmpeg_available().await {
            match extract_thumbnail_ffmpeg(&ctx.media, path, self.cmd_timeout_secs).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        asset_id = %ctx.asset.id,
                        error = %e,
                        "FFmpeg thumbnail extraction failed, writing placeholder"
                    );
                }
            }
        }

        // Placeholder proxy: a prefix of the source bytes. Image sources get
        // the full image so the thumbnail is usable as-is.
        let bytes = if ctx.asset.mime_type.starts_with("image/") {
            ctx.media.as_slice()
        } else {
            &ctx.media[..ctx.media.len().min(PLACEHOLDER_THUMB_BYTES)]
        };
        tokio::fs::write(path, bytes)
            .await
            .map_err(Error::Io)?;
        Ok(())
    }

    /// Keyframe timestamps at the configured interval across the probed
    /// duration. Without a probed duration only the opening frame is sampled.
    async fn keyframe_timestamps(&self, ctx: &StageContext) -> Vec<f64> {
        if !ctx.asset.mime_type.starts_with("video/") {
            return Vec::new();
        }
        let duration = if ffmpeg_available().await {
            probe_duration(&ctx.media, self.cmd_timeout_secs).await
        } else {
            None
        };
        match duration {
            Some(secs) if secs > 0.0 => {
                let mut stamps = Vec::new();
                let mut t = 0.0;
                while t < secs {
                    stamps.push(t);
                    t += self.keyframe_interval_secs;
                }
                stamps
            }
            _ => vec![0.0],
        }
    }
}

#[async_trait]
impl<A: AssetRepository> StageHandler for ProxyStage<A> {
    fn kind(&self) -> StageKind {
        StageKind::Proxy
    }

    async fn run(&self, ctx: &StageContext) -> StageOutcome {
        if ctx.is_cancelled() {
            return StageOutcome::Cancelled;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            return StageOutcome::Retry(format!("proxy output dir: {}", e));
        }

        let thumb_path = self.output_dir.join(format!("{}.jpg", ctx.asset.id));

        // A prior attempt may have produced the thumbnail already.
        let already_written = ctx
            .checkpoint
            .as_ref()
            .and_then(|c| c.get("thumbnail"))
            .is_some()
            && tokio::fs::try_exists(&thumb_path).await.unwrap_or(false);

        if !already_written {
            if let Err(e) = self.write_thumbnail(ctx, &thumb_path).await {
                return StageOutcome::Retry(format!("thumbnail: {}", e));
            }
        }
        ctx.report_progress(50, Some("thumbnail written"));

        if ctx.is_cancelled() {
            return StageOutcome::Cancelled;
        }

        let keyframes = self.keyframe_timestamps(ctx).await;
        debug!(
            asset_id = %ctx.asset.id,
            keyframes = keyframes.len(),
            "Proxy stage produced keyframe samples"
        );

        let thumb = thumb_path.to_string_lossy().to_string();
        if let Err(e) = self.assets.set_thumbnail(ctx.asset.id, thumb.clone()).await {
            return StageOutcome::Retry(format!("persist thumbnail: {}", e));
        }
        ctx.report_progress(100, Some("proxy complete"));

        StageOutcome::Success(Some(json!({
            "thumbnail": thumb,
            "keyframes": keyframes,
        })))
    }
}

async fn ffmpeg_available() -> bool {
    matches!(
        Command::new("ffmpeg").arg("-version").output().await,
        Ok(o) if o.status.success()
    )
}

/// Run a command that writes its output to files rather than stdout.
async fn run_cmd_status(cmd: &mut Command, timeout_secs: u64) -> Result<()> {
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| Error::Internal(format!("command timed out after {}s", timeout_secs)))?
        .map_err(|e| Error::Internal(format!("failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Internal(format!(
            "command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

async fn extract_thumbnail_ffmpeg(
    media: &[u8],
    out_path: &PathBuf,
    timeout_secs: u64,
) -> Result<()> {
    let mut input = NamedTempFile::new().map_err(Error::Io)?;
    input.write_all(media).map_err(Error::Io)?;

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-i")
        .arg(input.path())
        .arg("-vframes")
        .arg("1")
        .arg("-q:v")
        .arg("3")
        .arg(out_path);
    run_cmd_status(&mut cmd, timeout_secs).await
}

async fn probe_duration(media: &[u8], timeout_secs: u64) -> Option<f64> {
    let mut input = NamedTempFile::new().ok()?;
    input.write_all(media).ok()?;

    let output = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        Command::new("ffprobe")
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(input.path())
            .output(),
    )
    .await
    .ok()?
    .ok()?;

    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}
