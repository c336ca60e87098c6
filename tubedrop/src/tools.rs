//! Startup checks for the external programs the pipeline shells out to.

use std::path::Path;

use tracing::{debug, info};

use crate::config::ToolPaths;
use crate::error::{truncate_output, Error, Result};

/// Run `program version_flag` and return the first line it prints.
pub async fn ensure_available(program: &Path, version_flag: &str) -> Result<String> {
    let output = tokio::process::Command::new(program)
        .arg(version_flag)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            debug!(program = %program.display(), error = %e, "tool check failed");
            Error::ToolNotFound(program.display().to_string())
        })?;

    if !output.status.success() {
        return Err(Error::ToolNotFound(format!(
            "{} ({}): {}",
            program.display(),
            output.status,
            truncate_output(&output.stderr, 200)
        )));
    }

    let version = truncate_output(&output.stdout, 200)
        .lines()
        .next()
        .unwrap_or_default()
        .to_string();
    Ok(version)
}

/// Check yt-dlp and ffmpeg, failing on the first one missing.
pub async fn check_tools(tools: &ToolPaths) -> Result<()> {
    let ytdlp = ensure_available(&tools.ytdlp, "--version").await?;
    info!(program = %tools.ytdlp.display(), version = %ytdlp, "found yt-dlp");
    let ffmpeg = ensure_available(&tools.ffmpeg, "-version").await?;
    info!(program = %tools.ffmpeg.display(), version = %ffmpeg, "found ffmpeg");
    Ok(())
}
