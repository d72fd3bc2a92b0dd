// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-recovery persistence: the task table as one JSON document, written
//! atomically (temp file in the same directory, then renamed over the
//! target) and only ever read at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::task::{now_iso8601, Task, TaskStatus};

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedDocument {
    #[serde(default = "default_schema_version")]
    schema_version: u32,
    #[serde(default)]
    tasks: Vec<Task>,
}

fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

pub struct PersistenceAdapter {
    path: PathBuf,
}

impl PersistenceAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `tasks` to disk. Writes to `<path>.tmp` then renames over
    /// the target so a crash mid-write never leaves a corrupt document.
    pub async fn save(&self, tasks: &[Task]) -> Result<(), PersistenceError> {
        let document = PersistedDocument { schema_version: CURRENT_SCHEMA_VERSION, tasks: tasks.to_vec() };
        let json = serde_json::to_vec_pretty(&document)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PersistenceError::Write { path: parent.display().to_string(), source })?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|source| PersistenceError::Write { path: tmp_path.display().to_string(), source })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| PersistenceError::Write { path: self.path.display().to_string(), source })?;
        Ok(())
    }

    /// Read back the task table, applying recovery semantics (any
    /// `running`/`starting` task is forced to `failed`). Returns an empty
    /// vector if the file does not exist — first run has no prior state.
    pub async fn load(&self) -> Result<Vec<Task>, PersistenceError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| PersistenceError::Read { path: self.path.display().to_string(), source })?;
        let document: PersistedDocument = serde_json::from_slice(&bytes)?;
        Ok(recover_interrupted_tasks(document.tasks))
    }
}

/// Any task that was `running` or `starting` when the process stopped did
/// not survive the restart; it is forced to `failed` rather than replayed.
fn recover_interrupted_tasks(mut tasks: Vec<Task>) -> Vec<Task> {
    for task in &mut tasks {
        if matches!(task.status, TaskStatus::Running | TaskStatus::Starting) {
            task.status = TaskStatus::Failed;
            task.error = Some("Task interrupted by process restart".to_owned());
            task.completed_at = Some(now_iso8601());
            task.state_version += 1;
        }
    }
    tasks
}

#[cfg(test)]
#[path = "persistence_tests.rs"]
mod tests;
