// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task registry of disposable resources (mirror panes, temp files,
//! subscriptions) cleaned up in priority order on finalization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A single disposable resource. Lower `priority()` values are released
/// first.
#[async_trait]
pub trait Disposable: Send + Sync {
    async fn dispose(&self) -> Result<(), String>;
    fn is_disposed(&self) -> bool;
}

struct Entry {
    priority: i32,
    resource: Arc<dyn Disposable>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cleanup for task {task_id} had {} failure(s): {}", failures.len(), failures.join("; "))]
pub struct ResourceCleanupError {
    pub task_id: String,
    pub failures: Vec<String>,
}

#[derive(Default)]
pub struct ResourceManager {
    by_task: Mutex<HashMap<String, Vec<(String, Entry)>>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, task_id: impl Into<String>, resource_id: impl Into<String>, priority: i32, resource: Arc<dyn Disposable>) {
        let mut guard = self.by_task.lock().unwrap_or_else(|e| e.into_inner());
        guard.entry(task_id.into()).or_default().push((resource_id.into(), Entry { priority, resource }));
    }

    /// Number of still-registered resources for a task, for the health
    /// snapshot / read-only queries.
    pub fn resource_count(&self, task_id: &str) -> usize {
        let guard = self.by_task.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(task_id).map(Vec::len).unwrap_or(0)
    }

    /// Dispose every resource registered for `task_id`, lowest priority
    /// first, bounding each dispose by `timeout`. Collects every failure
    /// (including per-resource timeouts) rather than stopping at the first.
    pub async fn cleanup(&self, task_id: &str, timeout: Duration) -> Result<(), ResourceCleanupError> {
        let mut entries = {
            let mut guard = self.by_task.lock().unwrap_or_else(|e| e.into_inner());
            guard.remove(task_id).unwrap_or_default()
        };
        entries.sort_by_key(|(_, entry)| entry.priority);

        let mut failures = Vec::new();
        for (resource_id, entry) in entries {
            if entry.resource.is_disposed() {
                continue;
            }
            match tokio::time::timeout(timeout, entry.resource.dispose()).await {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => failures.push(format!("{resource_id}: {reason}")),
                Err(_) => failures.push(format!("{resource_id}: dispose timed out after {timeout:?}")),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ResourceCleanupError { task_id: task_id.to_owned(), failures })
        }
    }

    /// Best-effort cleanup of every task's resources, for process exit /
    /// termination signal handlers. Runs on whatever tokio runtime is
    /// current; if none is, this is a no-op — there is nothing synchronous
    /// left to do since disposal itself is async, and the disposals are
    /// fire-and-forget by design.
    pub fn cleanup_all_fire_and_forget(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else { return };
        let manager = Arc::clone(self);
        handle.spawn(async move {
            let task_ids: Vec<String> = {
                let guard = manager.by_task.lock().unwrap_or_else(|e| e.into_inner());
                guard.keys().cloned().collect()
            };
            for task_id in task_ids {
                if let Err(err) = manager.cleanup(&task_id, Duration::from_secs(5)).await {
                    tracing::warn!(%task_id, %err, "resource cleanup at shutdown failed");
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
