//! Throughput caps
//!
//! One token bucket per direction, shared by every connection of a session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct Bucket {
    /// May go negative; the deficit is paid back by waiting
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket limiting bytes per second. A rate of zero means unlimited.
#[derive(Debug)]
pub struct RateLimiter {
    rate: u64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            rate: bytes_per_sec,
            bucket: Mutex::new(Bucket {
                tokens: bytes_per_sec as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    /// Configured rate in bytes per second
    pub fn rate(&self) -> u64 {
        self.rate
    }

    pub fn is_unlimited(&self) -> bool {
        self.rate == 0
    }

    /// Take `bytes` from the bucket, waiting until the debt is repaid
    pub async fn acquire(&self, bytes: u64) {
        if self.is_unlimited() || bytes == 0 {
            return;
        }

        let wait = {
            let mut bucket = self.bucket.lock().await;
            self.refill(&mut bucket);
            bucket.tokens -= bytes as f64;
            if bucket.tokens >= 0.0 {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(-bucket.tokens / self.rate as f64)
            }
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Bytes that can be taken right now without waiting
    pub async fn available(&self) -> u64 {
        if self.is_unlimited() {
            return u64::MAX;
        }
        let mut bucket = self.bucket.lock().await;
        self.refill(&mut bucket);
        bucket.tokens.max(0.0) as u64
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate as f64).min(self.rate as f64);
        bucket.last_refill = now;
    }
}

/// Process-wide upload and download limiters
#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub upload: Arc<RateLimiter>,
    pub download: Arc<RateLimiter>,
}

impl RateLimiters {
    pub fn new(upload_bytes_per_sec: u64, download_bytes_per_sec: u64) -> Self {
        Self {
            upload: Arc::new(RateLimiter::new(upload_bytes_per_sec)),
            download: Arc::new(RateLimiter::new(download_bytes_per_sec)),
        }
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
