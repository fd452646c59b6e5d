/// Security module for protecting against common web attacks
/// Features:
/// - Login throttling (credential stuffing / brute force protection)
/// - Security headers (caching, sniffing, clickjacking, referrer leakage)

use actix_web::middleware::DefaultHeaders;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{AppError, AuthError};

/// Idle buckets are dropped once the map grows past this many clients,
/// at most once per `PRUNE_INTERVAL`
const PRUNE_THRESHOLD: usize = 10_000;
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Simple token bucket rate limiter implementation
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    fn new(requests_per_minute: u32) -> Self {
        Self {
            tokens: requests_per_minute as f64,
            last_refill: Instant::now(),
            capacity: requests_per_minute as f64,
            refill_rate: requests_per_minute as f64 / 60.0,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed_secs = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed_secs * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take_token(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_full(&self) -> bool {
        self.tokens >= self.capacity
    }
}

struct ThrottleState {
    buckets: HashMap<String, TokenBucket>,
    last_prune: Instant,
}

impl ThrottleState {
    fn new(now: Instant) -> Self {
        Self {
            buckets: HashMap::new(),
            last_prune: now,
        }
    }

    /// Drop refilled buckets; returns whether a prune ran
    fn maybe_prune(&mut self, now: Instant, threshold: usize) -> bool {
        if self.buckets.len() <= threshold
            || now.duration_since(self.last_prune) < PRUNE_INTERVAL
        {
            return false;
        }

        self.buckets.retain(|_, bucket| {
            bucket.refill(now);
            !bucket.is_full()
        });
        self.last_prune = now;
        true
    }
}

/// Per-client login attempt limiter
///
/// Every attempt costs a token, successful or not; a client gets
/// `requests_per_minute` attempts in a burst and regains them at the same
/// rate.
pub struct LoginThrottle {
    requests_per_minute: u32,
    state: Mutex<ThrottleState>,
}

impl LoginThrottle {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute: requests_per_minute.max(1),
            state: Mutex::new(ThrottleState::new(Instant::now())),
        }
    }

    /// Take one attempt for `client`
    ///
    /// # Errors
    /// `AuthError::TooManyAttempts` when the client's bucket is empty
    pub fn check(&self, client: &str) -> Result<(), AppError> {
        let now = Instant::now();
        let mut state = self.lock();

        if state.maybe_prune(now, PRUNE_THRESHOLD) {
            tracing::debug!(clients = state.buckets.len(), "Login throttle pruned");
        }

        let allowed = state
            .buckets
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket::new(self.requests_per_minute))
            .try_take_token(now);

        if allowed {
            Ok(())
        } else {
            tracing::warn!(client = %client, "Login attempts throttled");
            Err(AppError::Auth(AuthError::TooManyAttempts))
        }
    }

    fn lock(&self) -> MutexGuard<'_, ThrottleState> {
        // A panic mid-update leaves at worst one stale bucket
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Security headers attached to every response
pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Cache-Control", "no-store"))
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("X-Frame-Options", "DENY"))
        .add(("Referrer-Policy", "no-referrer"))
        .add((
            "Strict-Transport-Security",
            "max-age=31536000; includeSubDomains",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_allows_burst_then_rejects() {
        let throttle = LoginThrottle::new(3);

        for _ in 0..3 {
            assert!(throttle.check("10.0.0.1").is_ok());
        }
        assert!(matches!(
            throttle.check("10.0.0.1"),
            Err(AppError::Auth(AuthError::TooManyAttempts))
        ));
    }

    #[test]
    fn test_throttle_is_per_client() {
        let throttle = LoginThrottle::new(1);

        assert!(throttle.check("10.0.0.1").is_ok());
        assert!(throttle.check("10.0.0.1").is_err());
        assert!(throttle.check("10.0.0.2").is_ok());
    }

    #[test]
    fn test_bucket_refills_over_time() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(60);
        for _ in 0..60 {
            assert!(bucket.try_take_token(start));
        }
        assert!(!bucket.try_take_token(start));

        // 60 per minute refills one token per second
        assert!(bucket.try_take_token(start + Duration::from_millis(1100)));
        assert!(!bucket.try_take_token(start + Duration::from_millis(1100)));
    }

    #[test]
    fn test_bucket_never_exceeds_capacity() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(2);
        bucket.refill(start + Duration::from_secs(3600));
        assert!(bucket.is_full());
        assert!(bucket.tokens <= 2.0);
    }

    #[test]
    fn test_prune_runs_at_most_once_per_interval() {
        let start = Instant::now();
        let mut state = ThrottleState::new(start);
        for client in ["a", "b", "c"] {
            let mut bucket = TokenBucket::new(10);
            assert!(bucket.try_take_token(start));
            state.buckets.insert(client.to_string(), bucket);
        }

        // Over the threshold but inside the interval: left alone
        assert!(!state.maybe_prune(start + Duration::from_secs(1), 2));
        assert_eq!(state.buckets.len(), 3);

        // Interval elapsed: fully refilled buckets are dropped
        let later = start + PRUNE_INTERVAL;
        assert!(state.maybe_prune(later, 2));
        assert!(state.buckets.is_empty());

        // A busy map right after a prune waits for the next interval
        for client in ["d", "e", "f"] {
            let mut bucket = TokenBucket::new(10);
            assert!(bucket.try_take_token(later));
            state.buckets.insert(client.to_string(), bucket);
        }
        assert!(!state.maybe_prune(later + Duration::from_secs(5), 2));
        assert_eq!(state.buckets.len(), 3);
    }

    #[test]
    fn test_prune_skipped_below_threshold() {
        let start = Instant::now();
        let mut state = ThrottleState::new(start);
        state.buckets.insert("a".to_string(), TokenBucket::new(10));

        assert!(!state.maybe_prune(start + PRUNE_INTERVAL * 2, 2));
        assert_eq!(state.buckets.len(), 1);
    }
}
