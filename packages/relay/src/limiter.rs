//! Minimum-interval rate limiter shared by every task of the process.

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Spaces uses of a resource at least `min_interval` apart
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_use: Mutex<Option<Instant>>,
}

/// Exclusive right to use the limited resource once
///
/// Holding the permit blocks every other caller. Call [`Permit::record`]
/// when the use should count towards the interval.
pub struct Permit<'a> {
    last_use: MutexGuard<'a, Option<Instant>>,
}

impl Permit<'_> {
    pub fn record(mut self) {
        *self.last_use = Some(Instant::now());
    }
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_use: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait for exclusive access and for the interval to elapse
    pub async fn acquire(&self) -> Permit<'_> {
        let last_use = self.last_use.lock().await;
        if let Some(last) = *last_use {
            let ready_at = last + self.min_interval;
            if ready_at > Instant::now() {
                debug!("Rate limited, waiting {:?}", ready_at - Instant::now());
                sleep_until(ready_at).await;
            }
        }
        Permit { last_use }
    }
}
