//! Per-user daily download quota and the midnight reset task.
//!
//! A [`QuotaStore`] is created once at process start and shared by reference
//! (`Arc`) with the orchestrator and the bot front-end. It is never torn down;
//! the only mutation besides `increment` is the daily reset performed by a
//! [`ResetScheduler`].
//!
//! `check` and `increment` are separate operations: two requests
//! from the same user that pass `check` before either completes can push the
//! count past the limit by the number of extra in-flight requests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::UserId;

/// Per-user quota state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaRecord {
    /// Completed downloads since the last reset.
    pub count: u32,
    pub premium: bool,
}

/// Downloads left for a user today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    /// The daily limit is disabled for everyone.
    Unlimited,
    Premium,
    /// `daily_limit - count`; negative only if increments outran checks.
    Count(i64),
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remaining::Unlimited => write!(f, "Unlimited"),
            Remaining::Premium => write!(f, "Unlimited (Premium)"),
            Remaining::Count(n) => write!(f, "{n}"),
        }
    }
}

/// In-memory quota records keyed by user.
#[derive(Debug)]
pub struct QuotaStore {
    daily_limit: u32,
    records: Mutex<HashMap<UserId, QuotaRecord>>,
}

impl QuotaStore {
    /// A `daily_limit` of 0 means unlimited.
    pub fn new(daily_limit: u32) -> Self {
        Self {
            daily_limit,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    pub fn is_unlimited(&self) -> bool {
        self.daily_limit == 0
    }

    /// Whether the user may start another download. Creates the record if absent.
    pub fn check(&self, user: UserId) -> bool {
        let mut records = self.records.lock();
        let record = records.entry(user).or_default();
        self.is_unlimited() || record.premium || record.count < self.daily_limit
    }

    /// [`check`](Self::check) as a `QuotaExhausted` error.
    pub fn ensure(&self, user: UserId) -> Result<()> {
        if self.check(user) {
            Ok(())
        } else {
            Err(Error::QuotaExhausted {
                limit: self.daily_limit,
            })
        }
    }

    /// Count one completed download. Returns the new count.
    pub fn increment(&self, user: UserId) -> u32 {
        let mut records = self.records.lock();
        let record = records.entry(user).or_default();
        record.count = record.count.saturating_add(1);
        record.count
    }

    pub fn remaining(&self, user: UserId) -> Remaining {
        if self.is_unlimited() {
            return Remaining::Unlimited;
        }
        match self.records.lock().get(&user) {
            None => Remaining::Count(i64::from(self.daily_limit)),
            Some(record) if record.premium => Remaining::Premium,
            Some(record) => Remaining::Count(i64::from(self.daily_limit) - i64::from(record.count)),
        }
    }

    pub fn count(&self, user: UserId) -> u32 {
        self.records.lock().get(&user).map_or(0, |r| r.count)
    }

    pub fn set_premium(&self, user: UserId, premium: bool) {
        self.records.lock().entry(user).or_default().premium = premium;
    }

    pub fn is_premium(&self, user: UserId) -> bool {
        self.records.lock().get(&user).is_some_and(|r| r.premium)
    }

    /// Zero every record's count. Premium flags are kept. Returns the number of records touched.
    pub fn reset_all(&self) -> usize {
        let mut records = self.records.lock();
        for record in records.values_mut() {
            record.count = 0;
        }
        records.len()
    }
}

/// Owns the single repeating task that resets the quota at local midnight.
///
/// Starting again replaces the running task, so there is never more than one
/// timer. Dropping the scheduler stops it.
#[derive(Debug, Default)]
pub struct ResetScheduler {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ResetScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset `store` at every local midnight. Must be called inside a tokio runtime.
    pub fn start(&self, store: Arc<QuotaStore>) {
        self.start_with(store, until_next_local_midnight);
    }

    /// Reset `store` repeatedly, sleeping for `next_delay()` before each reset.
    pub fn start_with<F>(&self, store: Arc<QuotaStore>, next_delay: F)
    where
        F: Fn() -> Duration + Send + 'static,
    {
        let task = tokio::spawn(async move {
            loop {
                let delay = next_delay();
                debug!(secs = delay.as_secs(), "next quota reset scheduled");
                tokio::time::sleep(delay).await;
                let records = store.reset_all();
                info!(records, "daily limits reset");
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ResetScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Time left until the next local midnight.
pub fn until_next_local_midnight() -> Duration {
    duration_until_midnight(&chrono::Local::now())
}

/// Time from `now` until the following midnight in `now`'s time zone.
///
/// If that midnight does not exist (a DST gap), waits a full day instead.
pub fn duration_until_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    const FALLBACK: Duration = Duration::from_secs(24 * 60 * 60);

    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|naive| now.timezone().from_local_datetime(&naive).earliest());

    match next_midnight {
        Some(midnight) => midnight
            .signed_duration_since(now.clone())
            .to_std()
            .unwrap_or(FALLBACK),
        None => FALLBACK,
    }
}
