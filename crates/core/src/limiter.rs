// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-model concurrency limiter.
//!
//! Each model key has a live-permit count and a FIFO waiter queue. Model
//! limits are resolved by exact match, then by the first matching glob
//! pattern (`*` compiled to `.*`), then by a configured default. Patterns are
//! compiled once and cached.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use regex::Regex;
use tokio::sync::oneshot;
use tokio::time::timeout;

/// A permit held by the caller for the lifetime of one task's rate-limited
/// window. Dropping it without calling [`ConcurrencyLimiter::release`]
/// directly is a caller bug; the manager releases explicitly at finalize.
#[derive(Debug)]
pub struct Permit {
    pub model: String,
}

#[derive(Default)]
struct ModelState {
    count: u32,
    waiters: std::collections::VecDeque<oneshot::Sender<()>>,
}

struct Inner {
    limits: HashMap<String, u32>,
    patterns: Vec<(Regex, u32)>,
    default_limit: u32,
    models: HashMap<String, ModelState>,
}

/// FIFO, fairness-preserving per-model token pool.
pub struct ConcurrencyLimiter {
    inner: Mutex<Inner>,
    acquire_timeout: Duration,
}

impl ConcurrencyLimiter {
    /// `limits` is matched by exact model-key equality first. `pattern_limits`
    /// is a list of `(glob, limit)` matched in order after exact match fails;
    /// `*` in a glob compiles to `.*`. Unmatched models fall back to
    /// `default_limit`.
    pub fn new(
        limits: HashMap<String, u32>,
        pattern_limits: Vec<(String, u32)>,
        default_limit: u32,
        acquire_timeout: Duration,
    ) -> Self {
        let patterns = pattern_limits
            .into_iter()
            .filter_map(|(glob, limit)| {
                let pattern = format!("^{}$", regex::escape(&glob).replace(r"\*", ".*"));
                Regex::new(&pattern).ok().map(|re| (re, limit))
            })
            .collect();

        Self {
            inner: Mutex::new(Inner { limits, patterns, default_limit, models: HashMap::new() }),
            acquire_timeout,
        }
    }

    fn limit_for(inner: &Inner, model: &str) -> u32 {
        if let Some(limit) = inner.limits.get(model) {
            return *limit;
        }
        for (pattern, limit) in &inner.patterns {
            if pattern.is_match(model) {
                return *limit;
            }
        }
        inner.default_limit
    }

    /// Acquire a permit for `model`, waiting FIFO behind any earlier callers
    /// if the live count is already at the limit. Times out after
    /// `acquire_timeout` (default 5 minutes), removing itself from the queue.
    pub async fn acquire(&self, model: &str) -> Result<Permit, AcquireError> {
        let rx = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            let limit = Self::limit_for(&inner, model);
            let state = inner.models.entry(model.to_owned()).or_default();
            if state.count < limit {
                state.count += 1;
                return Ok(Permit { model: model.to_owned() });
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        match timeout(self.acquire_timeout, rx).await {
            Ok(Ok(())) => Ok(Permit { model: model.to_owned() }),
            Ok(Err(_)) => Err(AcquireError::Timeout),
            Err(_) => {
                // Timed out: drop our slot in the waiter queue if still present.
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(state) = inner.models.get_mut(model) {
                    state.waiters.retain(|w| !w.is_closed());
                }
                Err(AcquireError::Timeout)
            }
        }
    }

    /// Release a permit, transferring it directly to the next FIFO waiter if
    /// one exists, or decrementing the live count otherwise.
    pub fn release(&self, permit: Permit) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(state) = inner.models.get_mut(&permit.model) else { return };
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                // Transferred directly; count stays the same.
                return;
            }
        }
        state.count = state.count.saturating_sub(1);
    }

    /// Number of live permits currently held for `model` (read-only snapshot
    /// query, per the redesign note on avoiding private-map test reach-in).
    pub fn active_count(&self, model: &str) -> u32 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).models.get(model).map(|s| s.count).unwrap_or(0)
    }

    /// Number of callers currently waiting for `model`.
    pub fn waiting_count(&self, model: &str) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .models
            .get(model)
            .map(|s| s.waiters.len())
            .unwrap_or(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("timed out waiting for a concurrency permit")]
    Timeout,
}

#[cfg(test)]
#[path = "limiter_tests.rs"]
mod tests;
