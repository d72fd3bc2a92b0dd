// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only health snapshot, satisfying the "expose read-only snapshot
//! queries" redesign flag instead of letting callers reach into private
//! task-table state.

use std::collections::HashMap;

use serde::Serialize;

use crate::task::{Task, TaskStatus};

/// A point-in-time view of manager health, safe to serialize and expose
/// over the thin tool-surface binary's status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub counts_by_status: HashMap<TaskStatus, u64>,
    pub oldest_non_terminal_age_ms: Option<u64>,
    pub notification_breaker_open: bool,
    pub admission_queue_depth: usize,
    pub active_permits_by_model: HashMap<String, u32>,
}

/// Tally tasks by status. Pure function over a snapshot of the task table so
/// it can be tested without constructing a whole manager.
pub fn counts_by_status<'a>(tasks: impl Iterator<Item = &'a Task>) -> HashMap<TaskStatus, u64> {
    let mut counts = HashMap::new();
    for task in tasks {
        *counts.entry(task.status).or_insert(0) += 1;
    }
    counts
}

/// Age in milliseconds of the oldest task not yet in a terminal status, given
/// a `parse_started_at` callback that turns `Task::started_at` (or, absent
/// that, the task was never started and is excluded) into milliseconds since
/// the epoch.
pub fn oldest_non_terminal_age_ms<'a>(
    tasks: impl Iterator<Item = &'a Task>,
    now_ms: u64,
    parse_started_at: impl Fn(&str) -> Option<u64>,
) -> Option<u64> {
    tasks
        .filter(|task| !task.status.is_terminal())
        .filter_map(|task| task.started_at.as_deref().and_then(&parse_started_at))
        .map(|started_ms| now_ms.saturating_sub(started_ms))
        .max()
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
