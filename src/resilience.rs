//! Retry with backoff and a circuit breaker for calls to external services.
//!
//! Every call to the embedding model, the vector index and the commentary
//! API goes through a [`Guarded`] wrapper. The wrapped operation classifies
//! its own failures: retryable ones (timeouts, connection errors, 5xx, 429)
//! are retried with exponential backoff, terminal ones (other 4xx, decode
//! errors) are returned at once. A backend that keeps failing is taken out
//! of rotation for a cooldown period.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::ResilienceConfig;

/// Outcome of a single failed attempt, as judged by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// Transient failures (5xx, timeout, connection error), worth retrying
    Retryable(String),
    /// Permanent failures (4xx, malformed response), do not retry
    Terminal(String),
}

impl Failure {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Failure::Retryable(err.to_string());
        }
        match err.status() {
            Some(status) => Self::from_status(status, &err.to_string()),
            None if err.is_decode() || err.is_builder() => Failure::Terminal(err.to_string()),
            None => Failure::Retryable(err.to_string()),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, detail: &str) -> Self {
        let reason = format!("status {status}: {detail}");
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Failure::Retryable(reason)
        } else {
            Failure::Terminal(reason)
        }
    }
}

/// Typed failure of an external backend.
///
/// Distinguishes "backend unavailable" from "no results", which is an
/// empty `Ok`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("{backend} unavailable: {reason}")]
    Unavailable { backend: &'static str, reason: String },

    #[error("{backend} unavailable: circuit open, retry in {}s", .retry_in.as_secs().max(1))]
    CircuitOpen {
        backend: &'static str,
        retry_in: Duration,
    },

    #[error("{backend} rejected the request: {reason}")]
    Rejected { backend: &'static str, reason: String },
}

impl BackendError {
    pub fn backend(&self) -> &'static str {
        match self {
            BackendError::Unavailable { backend, .. }
            | BackendError::CircuitOpen { backend, .. }
            | BackendError::Rejected { backend, .. } => backend,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            BackendError::Unavailable { .. } | BackendError::CircuitOpen { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): doubles each time, capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl From<&ResilienceConfig> for RetryPolicy {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name,
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `Err(remaining)` while the breaker is open. Once the cooldown has
    /// passed a trial call is let through.
    pub fn check(&self) -> Result<(), Duration> {
        let mut state = self.lock();
        if let BreakerState::Open { until } = *state {
            let now = Instant::now();
            if now < until {
                return Err(until - now);
            }
            log::info!("{}: cooldown over, allowing a trial call", self.name);
            *state = BreakerState::HalfOpen;
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        if *state == BreakerState::HalfOpen {
            log::info!("{}: recovered, circuit closed", self.name);
        }
        *state = BreakerState::Closed { failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        let failures = match *state {
            BreakerState::Closed { failures } => failures + 1,
            BreakerState::HalfOpen => self.failure_threshold,
            BreakerState::Open { .. } => return,
        };

        if failures >= self.failure_threshold {
            log::warn!(
                "{}: {failures} consecutive failures, circuit open for {}s",
                self.name,
                self.cooldown.as_secs()
            );
            *state = BreakerState::Open {
                until: Instant::now() + self.cooldown,
            };
        } else {
            *state = BreakerState::Closed { failures };
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock(), BreakerState::Open { until } if Instant::now() < until)
    }
}

/// Retry policy and circuit breaker around one backend.
pub struct Guarded {
    backend: &'static str,
    policy: RetryPolicy,
    breaker: CircuitBreaker,
}

impl Guarded {
    pub fn new(backend: &'static str, config: &ResilienceConfig) -> Self {
        Self {
            backend,
            policy: RetryPolicy::from(config),
            breaker: CircuitBreaker::new(
                backend,
                config.failure_threshold,
                Duration::from_secs(config.cooldown_secs),
            ),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs `op` until it succeeds, fails terminally, or runs out of attempts.
    ///
    /// Only exhausted retries count against the breaker; a terminal failure
    /// means the backend answered.
    pub fn call<T>(&self, mut op: impl FnMut() -> Result<T, Failure>) -> Result<T, BackendError> {
        if let Err(retry_in) = self.breaker.check() {
            return Err(BackendError::CircuitOpen {
                backend: self.backend,
                retry_in,
            });
        }

        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(Failure::Terminal(reason)) => {
                    return Err(BackendError::Rejected {
                        backend: self.backend,
                        reason,
                    });
                }
                Err(Failure::Retryable(reason)) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    log::debug!(
                        "{}: retrying (attempt {}/{}) after error: {reason}, backoff {}ms",
                        self.backend,
                        attempt + 1,
                        self.policy.max_attempts,
                        delay.as_millis()
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(Failure::Retryable(reason)) => {
                    self.breaker.record_failure();
                    return Err(BackendError::Unavailable {
                        backend: self.backend,
                        reason,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn config(max_attempts: u32, failure_threshold: u32) -> ResilienceConfig {
        ResilienceConfig {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            failure_threshold,
            cooldown_secs: 60,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_millis(1000),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1000));
        assert_eq!(policy.backoff(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_retries_until_success() {
        let guarded = Guarded::new("test backend", &config(3, 5));
        let calls = Cell::new(0);

        let result = guarded.call(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(Failure::Retryable("timeout".into()))
            } else {
                Ok(42)
            }
        });

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_exhausted_retries_are_unavailable() {
        let guarded = Guarded::new("test backend", &config(2, 5));
        let calls = Cell::new(0);

        let result: Result<(), _> = guarded.call(|| {
            calls.set(calls.get() + 1);
            Err(Failure::Retryable("connection refused".into()))
        });

        assert_eq!(calls.get(), 2);
        let err = result.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(err.backend(), "test backend");
    }

    #[test]
    fn test_terminal_failure_not_retried() {
        let guarded = Guarded::new("test backend", &config(3, 1));
        let calls = Cell::new(0);

        let result: Result<(), _> = guarded.call(|| {
            calls.set(calls.get() + 1);
            Err(Failure::Terminal("status 400".into()))
        });

        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(BackendError::Rejected { .. })));
        assert!(!guarded.breaker().is_open());
    }

    #[test]
    fn test_breaker_opens_after_threshold() {
        let guarded = Guarded::new("test backend", &config(1, 2));
        let failing = || -> Result<(), Failure> { Err(Failure::Retryable("503".into())) };

        assert!(matches!(guarded.call(failing), Err(BackendError::Unavailable { .. })));
        assert!(!guarded.breaker().is_open());
        assert!(matches!(guarded.call(failing), Err(BackendError::Unavailable { .. })));
        assert!(guarded.breaker().is_open());

        let calls = Cell::new(0);
        let result = guarded.call(|| {
            calls.set(calls.get() + 1);
            Ok(())
        });
        assert!(matches!(result, Err(BackendError::CircuitOpen { .. })));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let guarded = Guarded::new("test backend", &config(1, 2));
        let _ = guarded.call(|| -> Result<(), Failure> { Err(Failure::Retryable("x".into())) });
        guarded.call(|| Ok(())).unwrap();
        let _ = guarded.call(|| -> Result<(), Failure> { Err(Failure::Retryable("x".into())) });
        assert!(!guarded.breaker().is_open());
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let breaker = CircuitBreaker::new("test backend", 1, Duration::ZERO);
        breaker.record_failure();
        // zero cooldown: the next check lets a trial call through
        assert!(breaker.check().is_ok());
        breaker.record_failure();
        assert!(breaker.check().is_ok());
        breaker.record_success();
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_status_classification() {
        use reqwest::StatusCode;
        assert!(matches!(
            Failure::from_status(StatusCode::BAD_GATEWAY, ""),
            Failure::Retryable(_)
        ));
        assert!(matches!(
            Failure::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            Failure::Retryable(_)
        ));
        assert!(matches!(
            Failure::from_status(StatusCode::NOT_FOUND, ""),
            Failure::Terminal(_)
        ));
    }
}
