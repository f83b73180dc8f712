//! Request admission: per-class bulkheads and an optional global token
//! bucket. Exhaustion is reported as 429, never queued.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use scholaris_api::ApiError;
use scholaris_query::QueryClass;

pub struct Admission {
    cheap: Arc<Semaphore>,
    medium: Arc<Semaphore>,
    heavy: Arc<Semaphore>,
    bucket: Option<Mutex<TokenBucket>>,
}

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last: Instant,
}

impl TokenBucket {
    fn take(&mut self, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Held for the lifetime of one admitted request.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl Admission {
    #[must_use]
    pub fn new(cheap: usize, medium: usize, heavy: usize, rps: u64, burst: u64) -> Self {
        let bucket = if rps > 0 {
            Some(Mutex::new(TokenBucket {
                tokens: burst.max(1) as f64,
                capacity: burst.max(1) as f64,
                refill_per_sec: rps as f64,
                last: Instant::now(),
            }))
        } else {
            None
        };
        Self {
            cheap: Arc::new(Semaphore::new(cheap.max(1))),
            medium: Arc::new(Semaphore::new(medium.max(1))),
            heavy: Arc::new(Semaphore::new(heavy.max(1))),
            bucket,
        }
    }

    /// Admits or rejects without waiting. A full bulkhead means the
    /// service is already working at its configured width for this kind
    /// of request.
    pub fn admit(&self, class: QueryClass) -> Result<AdmissionPermit, ApiError> {
        if let Some(bucket) = &self.bucket {
            let allowed = bucket
                .lock()
                .map(|mut b| b.take(Instant::now()))
                .unwrap_or(true);
            if !allowed {
                return Err(ApiError::rate_limited(class.as_str()));
            }
        }
        let semaphore = match class {
            QueryClass::Cheap => &self.cheap,
            QueryClass::Medium => &self.medium,
            QueryClass::Heavy => &self.heavy,
        };
        semaphore
            .clone()
            .try_acquire_owned()
            .map(|permit| AdmissionPermit { _permit: permit })
            .map_err(|_| ApiError::rate_limited(class.as_str()))
    }
}
