use std::time::Duration;

/// All errors that can occur in tubedrop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("video unavailable: {0}")]
    Resolution(String),

    #[error("no suitable {0} format found")]
    NoSuitableFormat(&'static str),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("download timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("mux error: {0}")]
    Mux(String),

    #[error("file too large: {size} bytes exceeds the {ceiling} byte limit")]
    SizeExceeded { size: u64, ceiling: u64 },

    #[error("daily download limit reached ({limit}/day)")]
    QuotaExhausted { limit: u32 },

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid callback payload: {0}")]
    InvalidCallback(String),

    #[error("link expired — send it again")]
    LinkExpired,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0} is not set — export it before starting the bot")]
    MissingToken(&'static str),

    #[error("{0} not found — make sure it is installed and on PATH")]
    ToolNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "ytdlp")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Policy rejections are expected outcomes rather than pipeline failures.
    pub fn is_policy(&self) -> bool {
        matches!(self, Error::SizeExceeded { .. } | Error::QuotaExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Keep at most `max` characters of external process output.
pub(crate) fn truncate_output(raw: &[u8], max: usize) -> String {
    String::from_utf8_lossy(raw).trim().chars().take(max).collect()
}
