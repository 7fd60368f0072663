//! Circuit breaker shared by every outbound HTTP call.
//!
//! # States
//!
//! - **Closed**: calls pass through and outcomes are recorded.
//! - **Open**: calls are rejected until the reset timeout elapses.
//! - **HalfOpen**: one probe call is let through; its outcome closes or
//!   re-opens the circuit.
//!
//! When the circuit trips is decided by the [`TripPolicy`].

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{BreakerKind, HttpClientConfig};

/// Window used by the error-rate policy.
const RATE_SAMPLE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TripPolicy {
    /// Trip after `n` failures in a row.
    Consecutive(u32),
    /// Trip when the failure ratio over the last samples reaches `rate`.
    ErrorRate { rate: f64, min_samples: usize },
    /// Trip after `n` failures since the circuit last closed.
    Threshold(u32),
}

impl TripPolicy {
    pub fn from_config(config: &HttpClientConfig) -> Self {
        match config.kind {
            BreakerKind::Consecutive => TripPolicy::Consecutive(config.consecutive_failures.max(1)),
            BreakerKind::ErrorRate => TripPolicy::ErrorRate {
                rate: config.error_rate,
                min_samples: RATE_SAMPLE_SIZE,
            },
            BreakerKind::Threshold => TripPolicy::Threshold(config.threshold.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Error, Debug)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error(transparent)]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: State,
    consecutive_failures: u32,
    failures: u32,
    samples: VecDeque<bool>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl Inner {
    fn reset(&mut self) {
        self.state = State::Closed;
        self.consecutive_failures = 0;
        self.failures = 0;
        self.samples.clear();
        self.opened_at = None;
        self.probe_in_flight = false;
    }

    fn trip(&mut self) {
        self.state = State::Open;
        self.opened_at = Some(Instant::now());
        self.probe_in_flight = false;
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    policy: TripPolicy,
    reset_timeout: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(policy: TripPolicy, reset_timeout: Duration) -> Self {
        Self {
            policy,
            reset_timeout,
            inner: Arc::new(Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                failures: 0,
                samples: VecDeque::with_capacity(RATE_SAMPLE_SIZE),
                opened_at: None,
                probe_in_flight: false,
            })),
        }
    }

    pub fn from_config(config: &HttpClientConfig) -> Self {
        Self::new(TripPolicy::from_config(config), config.reset_timeout)
    }

    pub async fn state(&self) -> State {
        self.inner.lock().await.state
    }

    /// Runs `operation` unless the circuit is open. `is_failure` decides
    /// whether a successful result still counts against the circuit.
    pub async fn call<F, Fut, T, E>(
        &self,
        operation: F,
        is_failure: impl Fn(&T) -> bool,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire().await {
            tracing::warn!("Circuit breaker is OPEN, rejecting request");
            return Err(BreakerError::Open);
        }

        match operation().await {
            Ok(value) => {
                self.record(!is_failure(&value)).await;
                Ok(value)
            }
            Err(err) => {
                self.record(false).await;
                Err(BreakerError::Inner(err))
            }
        }
    }

    async fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().await;
        // In half-open `opened_at` marks the start of the current probe; a
        // probe whose caller went away is replaced after another timeout.
        let expired = inner
            .opened_at
            .map(|at| at.elapsed() >= self.reset_timeout)
            .unwrap_or(true);
        match inner.state {
            State::Closed => true,
            State::HalfOpen if inner.probe_in_flight && !expired => false,
            State::Open if !expired => false,
            State::HalfOpen | State::Open => {
                if inner.state == State::Open {
                    tracing::info!("Circuit breaker transitioning OPEN -> HALF_OPEN");
                }
                inner.state = State::HalfOpen;
                inner.probe_in_flight = true;
                inner.opened_at = Some(Instant::now());
                true
            }
        }
    }

    async fn record(&self, success: bool) {
        let mut inner = self.inner.lock().await;

        if inner.state == State::HalfOpen {
            if success {
                tracing::info!("Circuit breaker transitioning HALF_OPEN -> CLOSED");
                inner.reset();
            } else {
                tracing::warn!("Circuit breaker transitioning HALF_OPEN -> OPEN (probe failed)");
                inner.trip();
            }
            return;
        }

        if inner.state == State::Open {
            return;
        }

        if success {
            inner.consecutive_failures = 0;
        } else {
            inner.consecutive_failures += 1;
            inner.failures += 1;
        }
        if inner.samples.len() == RATE_SAMPLE_SIZE {
            inner.samples.pop_front();
        }
        inner.samples.push_back(success);

        if self.should_trip(&inner) {
            tracing::warn!(policy = ?self.policy, "Circuit breaker transitioning CLOSED -> OPEN");
            inner.trip();
        }
    }

    fn should_trip(&self, inner: &Inner) -> bool {
        match self.policy {
            TripPolicy::Consecutive(n) => inner.consecutive_failures >= n,
            TripPolicy::Threshold(n) => inner.failures >= n,
            TripPolicy::ErrorRate { rate, min_samples } => {
                let samples = inner.samples.len();
                if samples < min_samples {
                    return false;
                }
                let failed = inner.samples.iter().filter(|ok| !**ok).count();
                failed as f64 / samples as f64 >= rate
            }
        }
    }
}
