use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{truncate_output, Error, Result};

/// Combines a video-only and an audio-only file into one playable container.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Write the muxed result to `output`, which must differ from both inputs.
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}

/// Muxes with an external ffmpeg: video stream copied, audio transcoded to AAC.
pub struct FfmpegMuxer {
    program: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-nostdin", "-y", "-loglevel", "error", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(video.into());
        args.push("-i".into());
        args.push(audio.into());
        args.extend(
            [
                "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac", "-b:a", "192k",
                "-movflags", "+faststart",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(output.into());
        args
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        if output == video || output == audio {
            return Err(Error::Mux("output path must differ from the inputs".into()));
        }

        info!(video = %video.display(), audio = %audio.display(), "muxing streams");

        let result = tokio::process::Command::new(&self.program)
            .args(Self::args(video, audio, output))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolNotFound(self.program.display().to_string())
                } else {
                    Error::Mux(format!("failed to run ffmpeg: {e}"))
                }
            })?;

        if !result.status.success() {
            return Err(Error::Mux(format!(
                "ffmpeg failed ({}): {}",
                result.status,
                truncate_output(&result.stderr, 1000)
            )));
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => {
                debug!(path = %output.display(), bytes = meta.len(), "mux complete");
                Ok(())
            }
            _ => Err(Error::Mux("ffmpeg produced no output".into())),
        }
    }
}
