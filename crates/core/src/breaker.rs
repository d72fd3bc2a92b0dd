// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker guarding the notification send path.
//!
//! Closed: calls pass, a consecutive-failure counter is maintained. At
//! `failure_threshold` the breaker opens. Open: calls are rejected until
//! `recovery_timeout` has elapsed, after which the next call is treated as a
//! half-open probe. Half-open: at most `half_open_max_calls` concurrent
//! probes are allowed; success closes the breaker and resets counters,
//! failure reopens it. A success outside half-open only resets the failure
//! counter.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_calls: u32,
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker open")]
    Open,
    #[error(transparent)]
    Inner(E),
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration, half_open_max_calls: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_in_flight: 0,
            }),
            failure_threshold,
            recovery_timeout,
            half_open_max_calls,
        }
    }

    /// Current breaker state, for the health snapshot.
    pub fn is_open(&self) -> bool {
        matches!(self.inner.lock().unwrap_or_else(|e| e.into_inner()).state, State::Open)
    }

    fn admit(&self) -> Result<bool, ()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            State::Closed => Ok(false),
            State::HalfOpen => {
                if inner.half_open_in_flight >= self.half_open_max_calls {
                    return Err(());
                }
                inner.half_open_in_flight += 1;
                Ok(true)
            }
            State::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or(Duration::ZERO);
                if elapsed >= self.recovery_timeout {
                    inner.state = State::HalfOpen;
                    inner.half_open_in_flight = 1;
                    Ok(true)
                } else {
                    Err(())
                }
            }
        }
    }

    fn record_success(&self, was_probe: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if was_probe {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
        if inner.state == State::HalfOpen {
            inner.state = State::Closed;
        }
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn record_failure(&self, was_probe: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if was_probe {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
            inner.state = State::Open;
            inner.opened_at = Some(Instant::now());
            return;
        }
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
            inner.state = State::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    /// Run `f` under breaker protection. Rejects immediately with
    /// [`BreakerError::Open`] when the breaker is open or half-open is
    /// saturated with in-flight probes.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let was_probe = match self.admit() {
            Ok(probe) => probe,
            Err(()) => return Err(BreakerError::Open),
        };

        match f().await {
            Ok(value) => {
                self.record_success(was_probe);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(was_probe);
                Err(BreakerError::Inner(err))
            }
        }
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
