use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{truncate_output, Error, Result};
use crate::link::validate_url;
use crate::resolver::{ByteStream, StreamResolver};
use crate::types::{StreamDescriptor, StreamKind, StreamSource, VideoDetails};

/// Availability values that mean the video cannot be fetched anonymously.
const BLOCKED_AVAILABILITY: &[&str] = &["private", "premium_only", "subscriber_only", "needs_auth"];

/// Protocols whose URL points at the complete elementary stream.
const DIRECT_PROTOCOLS: &[&str] = &["http", "https"];

#[derive(Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    channel: Option<String>,
    uploader: Option<String>,
    view_count: Option<u64>,
    is_live: Option<bool>,
    live_status: Option<String>,
    availability: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Deserialize)]
struct YtDlpFormat {
    url: Option<String>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    format_note: Option<String>,
    abr: Option<f64>,
    tbr: Option<f64>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    protocol: Option<String>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

/// Resolves links with `yt-dlp --dump-json` and streams the chosen formats over HTTP.
///
/// # Security
/// - URL is validated to start with http:// or https://
/// - Arguments are passed to yt-dlp via `.arg()` (no shell expansion)
/// - `--no-exec` prevents yt-dlp from running post-processing commands
pub struct YtDlpResolver {
    program: PathBuf,
    client: reqwest::Client,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            client: reqwest::Client::new(),
        }
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl StreamResolver for YtDlpResolver {
    async fn resolve(&self, url: &str) -> Result<VideoDetails> {
        validate_url(url)?;
        info!(%url, "resolving video");

        let output = tokio::process::Command::new(&self.program)
            .args(["--dump-json", "--no-download", "--no-playlist", "--no-exec"])
            .arg(url.trim())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::ToolNotFound(self.program.display().to_string())
                } else {
                    Error::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(Error::Resolution(truncate_output(&output.stderr, 1000)));
        }

        let details = parse_info(&output.stdout)?;
        debug!(
            title = %details.title,
            streams = details.streams.len(),
            "video resolved"
        );
        Ok(details)
    }

    async fn open(&self, descriptor: &StreamDescriptor) -> Result<ByteStream> {
        let mut request = self.client.get(&descriptor.source.url);
        for (name, value) in &descriptor.source.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Stream(format!("failed to open {} stream: {e}", descriptor.quality_label)))?;

        Ok(response
            .bytes_stream()
            .map_err(|e| Error::Stream(e.to_string()))
            .boxed())
    }
}

/// Convert `yt-dlp --dump-json` output into [`VideoDetails`].
fn parse_info(json: &[u8]) -> Result<VideoDetails> {
    let info: YtDlpInfo = serde_json::from_slice(json)?;

    let live = info.is_live.unwrap_or(false)
        || matches!(info.live_status.as_deref(), Some("is_live" | "is_upcoming"));
    if live {
        return Err(Error::Resolution("livestreams are not supported".into()));
    }

    if let Some(availability) = info.availability.as_deref() {
        if BLOCKED_AVAILABILITY.contains(&availability) {
            return Err(Error::Resolution(format!(
                "video is not publicly available ({availability})"
            )));
        }
    }

    let streams: Vec<StreamDescriptor> = info.formats.into_iter().filter_map(to_descriptor).collect();
    if streams.is_empty() {
        return Err(Error::Resolution("no downloadable streams".into()));
    }

    Ok(VideoDetails {
        title: info.title.unwrap_or_else(|| "video".into()),
        duration_seconds: info.duration.map_or(0, |d| d.max(0.0) as u64),
        channel: info.channel.or(info.uploader).unwrap_or_else(|| "unknown".into()),
        view_count: info.view_count.unwrap_or(0),
        streams,
    })
}

fn to_descriptor(format: YtDlpFormat) -> Option<StreamDescriptor> {
    let url = format.url?;
    let protocol = format.protocol.as_deref().unwrap_or("https");
    if !DIRECT_PROTOCOLS.contains(&protocol) {
        return None;
    }

    let has_video = format.vcodec.as_deref().is_none_or(|c| c != "none");
    let has_audio = format.acodec.as_deref().is_none_or(|c| c != "none");
    let kind = match (has_video, has_audio) {
        (true, true) => StreamKind::Muxed,
        (true, false) => StreamKind::VideoOnly,
        (false, true) => StreamKind::AudioOnly,
        (false, false) => return None,
    };

    let bitrate_kbps = match kind {
        StreamKind::AudioOnly => format.abr.or(format.tbr),
        _ => format.tbr,
    };
    let quality_label = match kind {
        StreamKind::AudioOnly => bitrate_kbps
            .map(|kbps| format!("{}kbps", kbps.round() as u64))
            .unwrap_or_else(|| "audio".into()),
        _ => format
            .format_note
            .clone()
            .filter(|note| !note.is_empty())
            .or_else(|| format.height.map(|h| format!("{h}p")))
            .unwrap_or_else(|| "video".into()),
    };

    Some(StreamDescriptor {
        kind,
        quality_label,
        content_length: format
            .filesize
            .or(format.filesize_approx)
            .map(|size| size.max(0.0) as u64),
        height: format.height,
        bitrate_kbps,
        extension: format.ext.unwrap_or_else(|| "bin".into()),
        source: StreamSource {
            url,
            headers: format.http_headers.into_iter().collect(),
        },
    })
}
