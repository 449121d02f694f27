use std::time::Duration;

use research_logging::research_trace;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Absorbs float drift from refill arithmetic.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateLimitError {
    #[error("invalid request: {requested} tokens requested, capacity is {capacity}")]
    InvalidRequest { requested: u32, capacity: u32 },
    #[error("invalid rate limiter configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Burst size.
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_per_sec: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: 5,
            refill_per_sec: 2.0,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    /// Lazy refill from elapsed wall-clock time, clamped to capacity.
    fn refill(&mut self, now: Instant, capacity: f64, refill_rate: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).clamp(0.0, capacity);
        self.last_refill = now;
    }
}

/// Token-bucket throttle shared by every caller of the inference backend.
///
/// The bucket starts full. Refill is computed on each acquisition attempt;
/// there is no background timer.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    refill_rate: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Result<Self, RateLimitError> {
        if capacity == 0 {
            return Err(RateLimitError::InvalidConfig(
                "capacity must be at least 1".into(),
            ));
        }
        if !refill_per_sec.is_finite() || refill_per_sec <= 0.0 {
            return Err(RateLimitError::InvalidConfig(format!(
                "refill rate must be positive, got {refill_per_sec}"
            )));
        }
        Ok(Self {
            capacity,
            refill_rate: refill_per_sec,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        })
    }

    pub fn from_settings(settings: &RateLimitSettings) -> Result<Self, RateLimitError> {
        Self::new(settings.capacity, settings.refill_per_sec)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Blocks until `n` tokens are available, then debits them.
    ///
    /// Check, refill and debit run inside one critical section. A caller that
    /// has to wait keeps the lock while sleeping for exactly the deficit, so
    /// waiters are served in arrival order and no token is spent twice.
    /// Returns how long the caller slept.
    pub async fn acquire(&self, n: u32) -> Result<Duration, RateLimitError> {
        if n == 0 || n > self.capacity {
            return Err(RateLimitError::InvalidRequest {
                requested: n,
                capacity: self.capacity,
            });
        }
        let needed = f64::from(n);
        let capacity = f64::from(self.capacity);
        let mut waited = Duration::ZERO;

        let mut bucket = self.bucket.lock().await;
        loop {
            bucket.refill(Instant::now(), capacity, self.refill_rate);
            if bucket.tokens + EPSILON >= needed {
                bucket.tokens = (bucket.tokens - needed).max(0.0);
                return Ok(waited);
            }
            let deficit = needed - bucket.tokens;
            let wait = Duration::from_nanos((deficit / self.refill_rate * 1e9).ceil() as u64)
                .max(Duration::from_nanos(1));
            research_trace!(
                "rate limiter waiting {:?} for {} token(s) (deficit {:.3})",
                wait,
                n,
                deficit
            );
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }

    /// Current token balance after a lazy refill.
    pub async fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now(), f64::from(self.capacity), self.refill_rate);
        bucket.tokens
    }
}
