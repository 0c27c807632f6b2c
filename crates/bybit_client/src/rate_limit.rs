//! Rate limiter for the Bybit API.
//!
//! Default budgets stay well under the per-UID limits: 10 reads/sec,
//! 5 writes/sec.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = GovLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Dual rate limiter: separate buckets for reads and writes.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    read_limiter: Arc<DirectLimiter>,
    write_limiter: Arc<DirectLimiter>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(10, 5)
    }

    /// Custom per-second limits. Zero is raised to one.
    pub fn with_limits(reads_per_sec: u32, writes_per_sec: u32) -> Self {
        let per_sec = |n: u32| Quota::per_second(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN));

        Self {
            read_limiter: Arc::new(GovLimiter::direct(per_sec(reads_per_sec))),
            write_limiter: Arc::new(GovLimiter::direct(per_sec(writes_per_sec))),
        }
    }

    /// Wait until a read slot is available.
    pub async fn wait_read(&self) {
        self.read_limiter.until_ready().await;
    }

    /// Wait until a write slot is available.
    pub async fn wait_write(&self) {
        self.write_limiter.until_ready().await;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
