//! Client-side throttling of outgoing calls.
//!
//! Token bucket shared by every clone of a client. The bucket starts full
//! with `max_requests` tokens and refills continuously at
//! `max_requests / per`. A call takes one token before it is sent, waiting
//! if the bucket is empty.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Ceiling on outgoing calls: `max_requests` per `per`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub per: Duration,
}

impl RateLimit {
    pub fn new(max_requests: u32, per: Duration) -> Self {
        Self { max_requests, per }
    }
}

impl Default for RateLimit {
    /// 100 calls per 10 seconds, the CRM's burst limit for private apps.
    fn default() -> Self {
        Self::new(100, Duration::from_secs(10))
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<Bucket>,
    capacity: f64,
    tokens_per_sec: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `limit` must have a non-zero count and window; the client config
    /// rejects anything else before a limiter is built.
    pub fn new(limit: RateLimit) -> Self {
        let capacity = f64::from(limit.max_requests.max(1));
        let window = limit.per.as_secs_f64().max(f64::EPSILON);
        Self {
            state: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            tokens_per_sec: capacity / window,
        }
    }

    /// Take a token if one is available, otherwise report how long until
    /// the next one.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        let mut bucket = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.tokens_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }
        let missing = 1.0 - bucket.tokens;
        Err(Duration::from_secs_f64(missing / self.tokens_per_sec))
    }

    /// Wait until a token is available and take it. Callers race this
    /// against their [`crate::CallContext`].
    pub async fn acquire(&self) {
        while let Err(wait) = self.try_acquire() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}
