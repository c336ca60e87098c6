//! Inline-button payloads.
//!
//! A payload is `action:tier:token`. The URL itself never travels in the
//! payload: it is stored in a [`LinkRegistry`] and referenced by an opaque
//! alphanumeric token, so URLs containing the delimiter (or longer than the
//! platform's 64-byte callback limit) survive intact.

use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::types::{Intent, QualityTier};

/// Platform limit on callback payload size.
pub const MAX_CALLBACK_BYTES: usize = 64;

/// Links remembered before the oldest ones are forgotten.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 10_000;

const DELIMITER: char = ':';

/// Opaque reference to a registered URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkToken(String);

impl LinkToken {
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 32
            && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(Error::InvalidCallback(format!("bad token \"{raw}\"")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The decoded contents of a button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackData {
    pub intent: Intent,
    pub token: LinkToken,
}

impl CallbackData {
    pub fn new(intent: Intent, token: LinkToken) -> Self {
        Self { intent, token }
    }

    pub fn encode(&self) -> String {
        let (action, tier) = match self.intent {
            Intent::Video(QualityTier::Highest) => ("video", "high"),
            Intent::Video(QualityTier::Lowest) => ("video", "low"),
            Intent::Audio => ("audio", "na"),
            Intent::Info => ("info", "na"),
        };
        format!("{action}{DELIMITER}{tier}{DELIMITER}{}", self.token.as_str())
    }

    pub fn decode(payload: &str) -> Result<Self> {
        let mut parts = payload.splitn(3, DELIMITER);
        let (Some(action), Some(tier), Some(token)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::InvalidCallback(format!("malformed payload \"{payload}\"")));
        };

        let intent = match (action, tier) {
            ("video", "high") => Intent::Video(QualityTier::Highest),
            ("video", "low") => Intent::Video(QualityTier::Lowest),
            ("audio", _) => Intent::Audio,
            ("info", _) => Intent::Info,
            _ => {
                return Err(Error::InvalidCallback(format!(
                    "unknown action \"{action}\" / tier \"{tier}\""
                )))
            }
        };

        Ok(Self {
            intent,
            token: LinkToken::parse(token)?,
        })
    }
}

struct RegistryInner {
    next: u64,
    links: HashMap<LinkToken, String>,
    order: VecDeque<LinkToken>,
}

/// Bounded map from tokens to the verbatim URLs they stand for.
///
/// Tokens carry a per-process prefix, so buttons left over from a previous
/// run resolve to nothing instead of to some other link.
pub struct LinkRegistry {
    prefix: String,
    capacity: usize,
    inner: Mutex<RegistryInner>,
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_CAPACITY)
    }
}

impl LinkRegistry {
    pub fn new(capacity: usize) -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u32;
        Self {
            prefix: format!("{epoch:x}"),
            capacity: capacity.max(1),
            inner: Mutex::new(RegistryInner {
                next: 0,
                links: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Remember `url` and return the token that refers to it.
    pub fn register(&self, url: &str) -> LinkToken {
        let mut inner = self.inner.lock();
        let token = LinkToken(format!("{}-{:x}", self.prefix, inner.next));
        inner.next += 1;

        while inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.links.remove(&oldest);
            }
        }
        inner.order.push_back(token.clone());
        inner.links.insert(token.clone(), url.to_string());
        token
    }

    pub fn lookup(&self, token: &LinkToken) -> Option<String> {
        self.inner.lock().links.get(token).cloned()
    }

    /// Look up the URL behind a payload's token.
    pub fn resolve(&self, token: &LinkToken) -> Result<String> {
        self.lookup(token).ok_or(Error::LinkExpired)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
