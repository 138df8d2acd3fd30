//! Attribute caching decorator.
//!
//! [`CachingFs`] wraps an [`AttributeProvider`](crate::fs::AttributeProvider) and hands out
//! [`CachingPath`]s. Each path owns a small expiring cache with one entry per
//! [`AttributeFamily`](crate::fs::AttributeFamily); attribute reads are answered from that cache
//! until its window elapses, attribute writes go to the backing filesystem first and then refresh
//! the affected family.

mod fs;
mod path;

pub use fs::CachingFs;
pub use path::CachingPath;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::clock::{SharedClock, SystemClock};

/// How long cached attributes stay valid when nothing else is configured.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Per-session cache configuration, shared by every path the session creates.
#[derive(Clone)]
pub struct CacheSettings {
    /// Length of one cache window.
    pub flush_interval: Duration,
    /// Time source for expiry.
    pub clock: SharedClock,
}

impl CacheSettings {
    /// Use `flush_interval` instead of the default.
    #[must_use]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Drive expiry from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            clock: Arc::new(SystemClock),
        }
    }
}

impl fmt::Debug for CacheSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSettings")
            .field("flush_interval", &self.flush_interval)
            .finish_non_exhaustive()
    }
}
