//! Politeness delay between consecutive requests
//!
//! The listing site gets at most one request per `min_interval`. Retries go
//! through the same limiter, so a retry storm cannot hammer the site.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Minimum-interval rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Allow one request per `min_interval`
    pub fn min_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until the next request may be sent and claim the slot.
    ///
    /// Returns how long the caller waited.
    pub async fn acquire(&self) -> Duration {
        let mut last = self.last_request.lock().await;
        let now = Instant::now();

        let waited = match *last {
            Some(previous) if self.min_interval > Duration::ZERO => {
                let ready_at = previous + self.min_interval;
                if ready_at > now {
                    sleep_until(ready_at).await;
                    ready_at - now
                } else {
                    Duration::ZERO
                }
            }
            _ => Duration::ZERO,
        };

        *last = Some(Instant::now());
        waited
    }
}
