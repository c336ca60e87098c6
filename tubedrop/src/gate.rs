use std::path::Path;

use tracing::warn;

use crate::error::{Error, Result};

/// Largest file the messaging platform reliably accepts from a bot (45 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 45 * 1024 * 1024;

/// Rejects artifacts larger than the upload ceiling.
#[derive(Debug, Clone, Copy)]
pub struct SizeGate {
    ceiling: u64,
}

impl Default for SizeGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl SizeGate {
    pub fn new(ceiling: u64) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Accept `size` if it is at most the ceiling.
    pub fn admit(&self, size: u64) -> Result<u64> {
        if size > self.ceiling {
            return Err(Error::SizeExceeded {
                size,
                ceiling: self.ceiling,
            });
        }
        Ok(size)
    }

    /// Measure the file at `path` and admit it. Returns its size in bytes.
    pub async fn check(&self, path: &Path) -> Result<u64> {
        let size = tokio::fs::metadata(path).await?.len();
        self.admit(size).inspect_err(|_| {
            warn!(path = %path.display(), size, ceiling = self.ceiling, "artifact over upload limit");
        })
    }
}
