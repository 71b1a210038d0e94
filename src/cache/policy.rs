//! Freshness policy for cached resources

use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Decides whether a cache record of a given age must be revalidated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Revalidate once the record is older than the given age
    MaxAge(Duration),
    /// Always revalidate (refresh dependencies)
    Always,
    /// Never revalidate (offline)
    Never,
}

impl CachePolicy {
    pub fn must_refresh(&self, age: Duration) -> bool {
        match self {
            Self::MaxAge(max) => age > *max,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::MaxAge(Duration::from_secs(24 * 60 * 60))
    }
}

/// Source of "now" for cache ages
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
///
/// Pin it to the moment a build started so every lookup in that build
/// sees the same ages.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Age of something stored at `cached_at`, clamped to zero for future stamps
pub fn age_since(clock: &dyn Clock, cached_at: DateTime<Utc>) -> Duration {
    (clock.now() - cached_at).to_std().unwrap_or(Duration::ZERO)
}
