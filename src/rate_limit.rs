use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter as KeyedLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a rate-limit check for one caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub success: bool,
    /// Whole seconds until the caller may try again, when limited.
    pub retry_after: Option<u64>,
}

impl RateLimitDecision {
    pub fn allowed() -> Self {
        Self {
            success: true,
            retry_after: None,
        }
    }

    pub fn limited(retry_after: u64) -> Self {
        Self {
            success: false,
            retry_after: Some(retry_after),
        }
    }
}

/// Per-IP submission throttle consulted before any processing happens.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, ip: &str) -> RateLimitDecision;
}

/// In-process keyed GCRA limiter.
///
/// Allows `requests` submissions per `window` per IP, refilling smoothly.
// See: https://docs.rs/governor/latest/governor/_guide/index.html#usage-in-multiple-threads
#[derive(Clone)]
pub struct GovernorRateLimiter {
    limiter: Arc<KeyedLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>,
    clock: DefaultClock,
}

impl GovernorRateLimiter {
    pub fn new(requests: NonZeroU32, window: Duration) -> Self {
        let period = window / requests.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(requests))
            .allow_burst(requests);
        let clock = DefaultClock::default();
        let limiter = Arc::new(KeyedLimiter::dashmap_with_clock(quota, &clock));
        Self { limiter, clock }
    }

    /// Number of IPs currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.limiter.len()
    }

    /// Forget IPs whose quota has fully replenished.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Prunes the per-IP state every `every`, needs to be spawned in a
    /// separate task.
    pub async fn clean_state(&self, every: Duration) {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            self.prune();
            tracing::debug!("Rate limiter tracking {} IPs after prune", self.tracked_keys());
        }
    }
}

#[async_trait]
impl RateLimiter for GovernorRateLimiter {
    async fn check(&self, ip: &str) -> RateLimitDecision {
        match self.limiter.check_key(&ip.to_string()) {
            Ok(()) => RateLimitDecision::allowed(),
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                // Round up so clients never retry a fraction of a second too early.
                let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
                RateLimitDecision::limited(secs.max(1))
            }
        }
    }
}
