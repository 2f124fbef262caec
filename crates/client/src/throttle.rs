use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::error::RemoteError;

/// Caps outstanding requests and, optionally, paces them with a leaky bucket
/// matching the remote's velocity policy.
#[derive(Debug)]
pub(crate) struct Throttle {
    permits: Arc<Semaphore>,
    bucket: Option<Mutex<LeakyBucket>>,
}

impl Throttle {
    pub(crate) fn new(pool_size: usize, requests_per_second: f64, respect_velocity: bool) -> Self {
        let pool_size = pool_size.max(1);
        let bucket = respect_velocity
            .then(|| Mutex::new(LeakyBucket::new(pool_size as f64, requests_per_second, Instant::now())));
        Self { permits: Arc::new(Semaphore::new(pool_size)), bucket }
    }

    /// Waits for a pool slot and for room in the bucket. The slot is released
    /// when the returned permit drops.
    pub(crate) async fn acquire(&self) -> Result<OwnedSemaphorePermit, RemoteError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| RemoteError::Transport("request pool is closed".to_owned()))?;

        if let Some(bucket) = &self.bucket {
            let wait = bucket.lock().await.reserve(Instant::now());
            if !wait.is_zero() {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "velocity limit reached, pacing request");
                tokio::time::sleep(wait).await;
            }
        }

        Ok(permit)
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[derive(Debug)]
pub(crate) struct LeakyBucket {
    level: f64,
    capacity: f64,
    drain_per_sec: f64,
    updated: Instant,
}

impl LeakyBucket {
    pub(crate) fn new(capacity: f64, drain_per_sec: f64, now: Instant) -> Self {
        Self { level: 0.0, capacity: capacity.max(1.0), drain_per_sec, updated: now }
    }

    /// Adds one request and returns how long the caller must wait before sending it.
    pub(crate) fn reserve(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.level = (self.level - elapsed * self.drain_per_sec).max(0.0);
        self.updated = now;

        let overflow = self.level + 1.0 - self.capacity;
        self.level += 1.0;
        if overflow <= 0.0 || self.drain_per_sec <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(overflow / self.drain_per_sec)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{LeakyBucket, Throttle};

    #[test]
    fn bucket_admits_bursts_up_to_capacity() {
        let start = Instant::now();
        let mut bucket = LeakyBucket::new(3.0, 2.0, start);

        assert_eq!(bucket.reserve(start), Duration::ZERO);
        assert_eq!(bucket.reserve(start), Duration::ZERO);
        assert_eq!(bucket.reserve(start), Duration::ZERO);
        assert_eq!(bucket.reserve(start), Duration::from_millis(500));
        assert_eq!(bucket.reserve(start), Duration::from_millis(1000));
    }

    #[test]
    fn bucket_drains_over_time() {
        let start = Instant::now();
        let mut bucket = LeakyBucket::new(2.0, 2.0, start);
        bucket.reserve(start);
        bucket.reserve(start);

        let later = start + Duration::from_secs(1);
        assert_eq!(bucket.reserve(later), Duration::ZERO);
    }

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let throttle = Throttle::new(2, 10.0, false);
        let first = throttle.acquire().await;
        assert!(first.is_ok());
        assert_eq!(throttle.available(), 1);
        drop(first);
        assert_eq!(throttle.available(), 2);
    }
}
