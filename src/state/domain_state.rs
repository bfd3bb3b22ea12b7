use std::time::Duration;
use tokio::time::Instant;

/// Per-domain token bucket state
///
/// Tokens refill continuously at `rate` per second up to `capacity`; one token
/// is consumed per request. The bucket never holds a negative token count.
#[derive(Debug, Clone)]
pub struct DomainBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
}

impl DomainBucket {
    /// Creates a full bucket
    pub fn new(rate: f64, capacity: f64) -> Self {
        Self {
            rate,
            capacity,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens currently available (as of the last refill)
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Adds the tokens earned since the last refill, capped at capacity
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes one token, or returns how long to wait before one is available
    pub fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64((1.0 - self.tokens) / self.rate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_bucket_is_full() {
        let bucket = DomainBucket::new(5.0, 5.0);
        assert_eq!(bucket.tokens(), 5.0);
        assert_eq!(bucket.rate(), 5.0);
        assert_eq!(bucket.capacity(), 5.0);
    }

    #[test]
    fn test_burst_then_wait() {
        let mut bucket = DomainBucket::new(2.0, 2.0);
        let now = Instant::now();

        assert!(bucket.try_take(now).is_ok());
        assert!(bucket.try_take(now).is_ok());

        let wait = bucket.try_take(now).unwrap_err();
        // Empty bucket at 2 tokens/sec needs half a second
        assert!((wait.as_secs_f64() - 0.5).abs() < 1e-3);
        assert!(bucket.tokens() >= 0.0);
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let mut bucket = DomainBucket::new(10.0, 3.0);
        let now = Instant::now();
        bucket.try_take(now).unwrap();

        bucket.refill(now + Duration::from_secs(60));
        assert_eq!(bucket.tokens(), 3.0);
    }

    #[test]
    fn test_partial_refill() {
        let mut bucket = DomainBucket::new(4.0, 1.0);
        let now = Instant::now();
        bucket.try_take(now).unwrap();

        bucket.refill(now + Duration::from_millis(125));
        assert!((bucket.tokens() - 0.5).abs() < 1e-6);

        let wait = bucket.try_take(now + Duration::from_millis(125)).unwrap_err();
        assert!((wait.as_secs_f64() - 0.125).abs() < 1e-3);
    }
}
