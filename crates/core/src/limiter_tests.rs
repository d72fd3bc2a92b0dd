// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

fn limiter_with(default_limit: u32) -> ConcurrencyLimiter {
    ConcurrencyLimiter::new(
        HashMap::new(),
        vec![("anthropic/*".to_owned(), 3), ("openai/*".to_owned(), 5), ("google/*".to_owned(), 10)],
        default_limit,
        Duration::from_millis(200),
    )
}

#[tokio::test]
async fn exact_match_beats_pattern() {
    let mut limits = HashMap::new();
    limits.insert("anthropic/claude-opus".to_owned(), 1);
    let limiter =
        ConcurrencyLimiter::new(limits, vec![("anthropic/*".to_owned(), 3)], 3, Duration::from_secs(5));

    let _p1 = limiter.acquire("anthropic/claude-opus").await.unwrap();
    assert_eq!(limiter.active_count("anthropic/claude-opus"), 1);

    let result = tokio::time::timeout(Duration::from_millis(50), limiter.acquire("anthropic/claude-opus")).await;
    assert!(result.is_err(), "exact-match limit of 1 should block a second acquire");
}

#[tokio::test]
async fn pattern_applies_when_no_exact_match() {
    let limiter = limiter_with(3);
    let _p1 = limiter.acquire("google/gemini-pro").await.unwrap();
    let _p2 = limiter.acquire("google/gemini-pro").await.unwrap();
    assert_eq!(limiter.active_count("google/gemini-pro"), 2);
}

#[tokio::test]
async fn unmatched_model_uses_default() {
    let limiter = limiter_with(1);
    let p1 = limiter.acquire("mystery-provider/model").await.unwrap();
    assert_eq!(limiter.active_count("mystery-provider/model"), 1);
    limiter.release(p1);
    assert_eq!(limiter.active_count("mystery-provider/model"), 0);
}

#[tokio::test]
async fn fairness_serves_waiters_fifo() {
    let limiter = std::sync::Arc::new(limiter_with(1));

    let permit = limiter.acquire("default").await.unwrap();

    let l2 = std::sync::Arc::clone(&limiter);
    let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let o1 = std::sync::Arc::clone(&order);
    let waiter_a = tokio::spawn(async move {
        let _permit = l2.acquire("default").await.unwrap();
        o1.lock().unwrap().push("a");
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let l3 = std::sync::Arc::clone(&limiter);
    let o2 = std::sync::Arc::clone(&order);
    let waiter_b = tokio::spawn(async move {
        let _permit = l3.acquire("default").await.unwrap();
        o2.lock().unwrap().push("b");
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    limiter.release(permit);
    waiter_a.await.unwrap();
    waiter_b.await.unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn acquire_times_out_and_unblocks_after_timeout() {
    let limiter = limiter_with(1);
    let _held = limiter.acquire("default").await.unwrap();
    let result = limiter.acquire("default").await;
    assert!(matches!(result, Err(AcquireError::Timeout)));
}
