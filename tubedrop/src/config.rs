use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::fetch::DEFAULT_FETCH_TIMEOUT;
use crate::gate::DEFAULT_MAX_UPLOAD_BYTES;
use crate::types::UserId;

pub const BOT_TOKEN_ENV: &str = "BOT_TOKEN";
pub const DAILY_LIMIT_ENV: &str = "DAILY_LIMIT";
pub const MAX_UPLOAD_MB_ENV: &str = "MAX_UPLOAD_MB";
pub const FETCH_TIMEOUT_ENV: &str = "FETCH_TIMEOUT_SECS";
pub const PREMIUM_USERS_ENV: &str = "PREMIUM_USERS";
pub const WORK_DIR_ENV: &str = "TUBEDROP_WORK_DIR";
pub const YTDLP_PATH_ENV: &str = "YTDLP_PATH";
pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";

/// Free downloads per user per day.
pub const DEFAULT_DAILY_LIMIT: u32 = 5;

/// A secret that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

/// Locations of the external executables the pipeline shells out to.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ytdlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl ToolPaths {
    /// Read `YTDLP_PATH` / `FFMPEG_PATH`, falling back to the bare program names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            ytdlp: non_empty(lookup(YTDLP_PATH_ENV))
                .map(PathBuf::from)
                .unwrap_or(defaults.ytdlp),
            ffmpeg: non_empty(lookup(FFMPEG_PATH_ENV))
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Runtime settings for the bot and the download pipeline.
#[derive(Debug, Clone)]
pub struct Settings {
    pub token: Secret,
    /// Downloads allowed per user per day; 0 disables the limit.
    pub daily_limit: u32,
    /// Largest artifact that may be handed to delivery, in bytes.
    pub max_upload_bytes: u64,
    pub fetch_timeout: Duration,
    pub work_dir: Option<PathBuf>,
    pub premium_users: Vec<UserId>,
    pub tools: ToolPaths,
}

impl Settings {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token),
            daily_limit: DEFAULT_DAILY_LIMIT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            work_dir: None,
            premium_users: Vec::new(),
            tools: ToolPaths::default(),
        }
    }

    pub fn daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = limit;
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn work_dir(mut self, dir: PathBuf) -> Self {
        self.work_dir = Some(dir);
        self
    }

    pub fn premium_users(mut self, users: Vec<UserId>) -> Self {
        self.premium_users = users;
        self
    }

    pub fn tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup.
    ///
    /// `BOT_TOKEN` is mandatory; every other key has a default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = non_empty(lookup(BOT_TOKEN_ENV)).ok_or(Error::MissingToken(BOT_TOKEN_ENV))?;
        let mut settings = Settings::new(token).tools(ToolPaths::from_lookup(&lookup));

        if let Some(limit) = parse_key::<u32>(&lookup, DAILY_LIMIT_ENV)? {
            settings.daily_limit = limit;
        }
        if let Some(mb) = parse_key::<u64>(&lookup, MAX_UPLOAD_MB_ENV)? {
            if mb == 0 {
                return Err(Error::Config(format!("{MAX_UPLOAD_MB_ENV} must be greater than 0")));
            }
            settings.max_upload_bytes = mb
                .checked_mul(1024 * 1024)
                .ok_or_else(|| Error::Config(format!("{MAX_UPLOAD_MB_ENV} is too large: {mb}")))?;
        }
        if let Some(secs) = parse_key::<u64>(&lookup, FETCH_TIMEOUT_ENV)? {
            if secs == 0 {
                return Err(Error::Config(format!("{FETCH_TIMEOUT_ENV} must be greater than 0")));
            }
            settings.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = non_empty(lookup(PREMIUM_USERS_ENV)) {
            settings.premium_users = parse_user_list(&raw)?;
        }
        if let Some(dir) = non_empty(lookup(WORK_DIR_ENV)) {
            settings.work_dir = Some(PathBuf::from(dir));
        }

        Ok(settings)
    }

    /// Resolve the temp directory, defaulting to ~/.cache/tubedrop/work.
    pub fn resolve_work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("tubedrop")
                .join("work")
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_key<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match non_empty(lookup(key)) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} has an invalid value: \"{raw}\""))),
    }
}

fn parse_user_list(raw: &str) -> Result<Vec<UserId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse()
                .map(UserId)
                .map_err(|_| Error::Config(format!("{PREMIUM_USERS_ENV} contains an invalid user id: \"{part}\"")))
        })
        .collect()
}
