use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Opaque user identifier supplied by the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a single candidate stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Video and audio in one container.
    Muxed,
    VideoOnly,
    AudioOnly,
}

/// What the user wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Coarse selection among the available quality variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    #[default]
    Highest,
    Lowest,
}

/// The action a user picked for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Video(QualityTier),
    Audio,
    /// Metadata only; never downloads and never consumes quota.
    Info,
}

impl Intent {
    /// Media kind and tier to fetch, or `None` for [`Intent::Info`].
    pub fn fetch_target(&self) -> Option<(MediaKind, QualityTier)> {
        match self {
            Intent::Video(tier) => Some((MediaKind::Video, *tier)),
            Intent::Audio => Some((MediaKind::Audio, QualityTier::Highest)),
            Intent::Info => None,
        }
    }
}

/// Where a stream's bytes can be read from. Only the resolver that produced
/// it interprets the contents.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSource {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Resolved metadata for one candidate stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub kind: StreamKind,
    /// Human-readable quality, e.g. "720p" or "128kbps".
    pub quality_label: String,
    /// Declared byte length, when the source advertises one.
    pub content_length: Option<u64>,
    pub height: Option<u32>,
    pub bitrate_kbps: Option<f64>,
    /// File extension of the elementary stream container ("mp4", "webm", "m4a").
    pub extension: String,
    pub source: StreamSource,
}

/// Everything the resolver knows about a video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoDetails {
    pub title: String,
    pub duration_seconds: u64,
    pub channel: String,
    pub view_count: u64,
    pub streams: Vec<StreamDescriptor>,
}

impl VideoDetails {
    /// Multi-line summary shown for the "info" action.
    pub fn summary(&self) -> String {
        format!(
            "📹 Video Info\n\nTitle: {}\nChannel: {}\nDuration: {}\nViews: {}",
            self.title,
            self.channel,
            format_duration(self.duration_seconds),
            group_thousands(self.view_count),
        )
    }
}

/// The final deliverable handed to the delivery collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub title: String,
    pub size_bytes: u64,
    pub kind: MediaKind,
    pub quality_label: Option<String>,
}

impl Artifact {
    /// Caption attached to the uploaded media.
    pub fn caption(&self) -> String {
        match (self.kind, &self.quality_label) {
            (MediaKind::Video, Some(quality)) => format!(
                "🎬 {}\n📦 {} | {}",
                self.title,
                format_bytes(self.size_bytes),
                quality
            ),
            (MediaKind::Video, None) => {
                format!("🎬 {}\n📦 {}", self.title, format_bytes(self.size_bytes))
            }
            (MediaKind::Audio, _) => {
                format!("🎵 {}\n📦 {}", self.title, format_bytes(self.size_bytes))
            }
        }
    }
}

/// Format a byte count with 1024-based units and at most two decimals.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".into();
    }

    let mut unit = 0;
    let mut divisor = 1u64;
    while unit < UNITS.len() - 1 && bytes >= divisor * 1024 {
        divisor *= 1024;
        unit += 1;
    }

    let value = (bytes as f64 / divisor as f64 * 100.0).round() / 100.0;
    format!("{value} {}", UNITS[unit])
}

/// Replace anything outside `[A-Za-z0-9_-]` with `_` and cap the length at 100.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect()
}

fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
