// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

async fn ok() -> Result<(), &'static str> {
    Ok(())
}

async fn fail() -> Result<(), &'static str> {
    Err("boom")
}

#[tokio::test]
async fn opens_after_threshold_consecutive_failures() {
    let breaker = CircuitBreaker::new(3, Duration::from_secs(30), 3);

    for _ in 0..2 {
        let result = breaker.call(fail).await;
        assert!(matches!(result, Err(BreakerError::Inner(_))));
        assert!(!breaker.is_open());
    }

    let result = breaker.call(fail).await;
    assert!(matches!(result, Err(BreakerError::Inner(_))));
    assert!(breaker.is_open());
}

#[tokio::test]
async fn open_breaker_rejects_immediately() {
    let breaker = CircuitBreaker::new(1, Duration::from_secs(30), 3);
    let _ = breaker.call(fail).await;
    assert!(breaker.is_open());

    let result = breaker.call(ok).await;
    assert!(matches!(result, Err(BreakerError::Open)));
}

#[tokio::test]
async fn success_resets_failure_counter_while_closed() {
    let breaker = CircuitBreaker::new(2, Duration::from_secs(30), 3);
    let _ = breaker.call(fail).await;
    let _ = breaker.call(ok).await;
    let _ = breaker.call(fail).await;
    assert!(!breaker.is_open(), "single failure after a reset should not trip the breaker");
}

#[tokio::test]
async fn half_open_probe_success_closes_breaker() {
    let breaker = CircuitBreaker::new(1, Duration::from_millis(20), 3);
    let _ = breaker.call(fail).await;
    assert!(breaker.is_open());

    tokio::time::sleep(Duration::from_millis(30)).await;

    let result = breaker.call(ok).await;
    assert!(result.is_ok());
    assert!(!breaker.is_open());
}

#[tokio::test]
async fn half_open_probe_failure_reopens_breaker() {
    let breaker = CircuitBreaker::new(1, Duration::from_millis(20), 3);
    let _ = breaker.call(fail).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let result = breaker.call(fail).await;
    assert!(matches!(result, Err(BreakerError::Inner(_))));
    assert!(breaker.is_open());
}
