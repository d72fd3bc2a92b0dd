// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscribes to the event bus and maintains counters and a duration
//! histogram, the way the daemon's usage-metrics collector maintains a
//! health handle for its own supervisory loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::event::{EventBus, EventKind, TaskEvent};

#[derive(Default)]
struct Inner {
    counts_by_kind: HashMap<EventKind, u64>,
    completion_durations_ms: Vec<u64>,
}

pub struct MetricsCollector {
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub counts_by_kind: HashMap<EventKind, u64>,
    pub completions_observed: u64,
    pub p50_completion_ms: Option<u64>,
    pub p99_completion_ms: Option<u64>,
}

impl MetricsCollector {
    /// Attach a new collector to `events`. The returned `Arc` must be kept
    /// alive by the caller for as long as metrics should be collected — the
    /// subscription itself holds only a weak-equivalent clone internally via
    /// the event bus's owned closure.
    pub fn attach(events: &EventBus) -> Arc<Self> {
        let collector = Arc::new(Self { inner: Mutex::new(Inner::default()) });
        let recorder = Arc::clone(&collector);
        events.subscribe_all(move |event| recorder.record(event));
        collector
    }

    fn record(&self, event: &TaskEvent) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *inner.counts_by_kind.entry(event.kind).or_insert(0) += 1;
    }

    /// Record the wall-clock duration of a completed task (any terminal
    /// status), for the p50/p99 histogram. Called by the manager once it has
    /// both `startedAt` and `completedAt`.
    pub fn record_completion_duration_ms(&self, millis: u64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.completion_durations_ms.push(millis);
    }

    pub fn count(&self, kind: EventKind) -> u64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.counts_by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut durations = inner.completion_durations_ms.clone();
        durations.sort_unstable();
        MetricsSnapshot {
            counts_by_kind: inner.counts_by_kind.clone(),
            completions_observed: durations.len() as u64,
            p50_completion_ms: percentile(&durations, 0.50),
            p99_completion_ms: percentile(&durations, 0.99),
        }
    }
}

fn percentile(sorted: &[u64], p: f64) -> Option<u64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted.get(idx).copied()
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
