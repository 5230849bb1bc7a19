//! Token-bucket rate limiter keyed by arbitrary strings
//! (e.g. `http:<ip>`, `ws:<ip>`, `user:<id>`).

use std::{
    collections::HashMap,
    sync::Mutex,
    time::Instant,
};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Per-minute token buckets. A bucket with capacity `max` refills at
/// `max / 60` tokens per second; consuming below one token fails without
/// mutating the bucket.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Try to consume one token from `key`'s bucket (capacity
    /// `max_per_minute`). Returns `false` when the bucket is exhausted.
    pub fn check(&self, key: &str, max_per_minute: u32) -> bool {
        let capacity = f64::from(max_per_minute);
        let refill_per_sec = capacity / 60.0;

        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_per_sec).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
