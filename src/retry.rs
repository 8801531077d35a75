use std::future::Future;
use std::time::Duration;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// The retry policy a destination is delivered with.
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    max_attempts: u32,
    /// Coefficient to multiply initial_interval with for every past attempt.
    backoff_coefficient: u32,
    /// The backoff interval for the first retry.
    initial_interval: Duration,
    /// The maximum possible backoff between retries.
    maximum_interval: Option<Duration>,
}

/// How a retried operation ended.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        backoff_coefficient: u32,
        initial_interval: Duration,
        maximum_interval: Option<Duration>,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_coefficient,
            initial_interval,
            maximum_interval,
        }
    }

    /// A policy that never retries.
    pub fn single_attempt() -> Self {
        Self::new(1, 1, Duration::ZERO, None)
    }

    /// Backoff before the retry that follows `attempt` failed attempts (0-based).
    pub fn time_until_next_retry(&self, attempt: u32) -> Duration {
        let candidate_interval = self
            .initial_interval
            .saturating_mul(self.backoff_coefficient.saturating_pow(attempt));

        match self.maximum_interval {
            Some(max_interval) => std::cmp::min(candidate_interval, max_interval),
            None => candidate_interval,
        }
    }

    /// Run `operation` until it succeeds, attempts run out, or `is_retryable`
    /// rejects the error.
    pub async fn run<T, E, F, Fut, P>(&self, mut operation: F, is_retryable: P) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(err) if attempt < self.max_attempts && is_retryable(&err) => {
                    let backoff = self.time_until_next_retry(attempt - 1);
                    tracing::warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        err,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    return RetryOutcome {
                        result: Err(err),
                        attempts: attempt,
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    /// Three attempts, 1s then 2s apart, never more than 5s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_coefficient: 2,
            initial_interval: Duration::from_secs(1),
            maximum_interval: Some(Duration::from_secs(5)),
        }
    }
}
