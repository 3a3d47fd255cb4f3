//! Token bucket used for every (credential, endpoint type) pair.

use std::time::{Duration, Instant};

/// Continuous-refill token bucket.
///
/// Starts full. Capacity equals the configured rate, but never drops below a
/// single token so sub-1 QPS budgets still admit requests.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    updated: Instant,
    exhausted: bool,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64, now: Instant) -> Self {
        assert!(
            rate_per_sec.is_finite() && rate_per_sec > 0.0,
            "token bucket rate must be positive, got {rate_per_sec}"
        );
        let capacity = rate_per_sec.max(1.0);
        Self {
            rate: rate_per_sec,
            capacity,
            tokens: capacity,
            updated: now,
            exhausted: false,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Tokens currently in the bucket, after refilling up to `now`.
    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    /// Take one token if present.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until one whole token is available, as of the last refill.
    pub fn time_until_available(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - self.tokens) / self.rate).max(Duration::from_nanos(1))
        }
    }

    /// A bucket marked exhausted never hands out tokens again.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
            self.updated = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_full() {
        let now = Instant::now();
        let mut bucket = TokenBucket::new(3.0, now);
        assert!(bucket.try_acquire(now));
        assert!(bucket.try_acquire(now));
        assert!(bucket.try_acquire(now));
        assert!(!bucket.try_acquire(now));
    }

    #[test]
    fn refills_continuously() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2.0, start);
        assert!(bucket.try_acquire(start));
        assert!(bucket.try_acquire(start));
        assert!(!bucket.try_acquire(start + Duration::from_millis(400)));
        assert!(bucket.try_acquire(start + Duration::from_millis(600)));
    }

    #[test]
    fn never_exceeds_capacity() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2.0, start);
        assert_eq!(bucket.available(start + Duration::from_secs(60)), 2.0);
    }

    #[test]
    fn waiting_time_matches_deficit() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(4.0, start);
        for _ in 0..4 {
            assert!(bucket.try_acquire(start));
        }
        assert_eq!(bucket.time_until_available(), Duration::from_millis(250));
    }

    #[test]
    fn sub_one_rate_still_admits_a_request() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(0.5, start);
        assert_eq!(bucket.capacity(), 1.0);
        assert!(bucket.try_acquire(start));
        assert!(!bucket.try_acquire(start + Duration::from_secs(1)));
        assert!(bucket.try_acquire(start + Duration::from_secs(2)));
    }

    /// N grants at rate r need at least (N - capacity) / r seconds of refill.
    #[test]
    fn grant_schedule_respects_rate() {
        let start = Instant::now();
        let rate = 5.0;
        let mut bucket = TokenBucket::new(rate, start);
        let mut now = start;
        let mut granted = 0;
        while granted < 20 {
            if bucket.try_acquire(now) {
                granted += 1;
            } else {
                now += bucket.time_until_available();
            }
        }
        let elapsed = now.duration_since(start).as_secs_f64();
        assert!(elapsed >= (20.0 - rate) / rate - 1e-6, "elapsed {}", elapsed);
    }
}
