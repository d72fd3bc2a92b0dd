// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::config::ManagerConfig;

fn task(status: TaskStatus) -> Task {
    let mut task = Task::new("parent-1", "explorer", "d", "p", None, Arc::new(ManagerConfig::default()));
    task.status = status;
    task
}

#[tokio::test]
async fn save_then_load_round_trips_terminal_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = PersistenceAdapter::new(dir.path().join("background-tasks.json"));

    let tasks = vec![task(TaskStatus::Completed), task(TaskStatus::Failed)];
    adapter.save(&tasks).await.unwrap();

    let loaded = adapter.load().await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].id, tasks[0].id);
    assert_eq!(loaded[0].status, TaskStatus::Completed);
}

#[tokio::test]
async fn load_with_no_file_returns_empty() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = PersistenceAdapter::new(dir.path().join("missing.json"));
    let loaded = adapter.load().await.unwrap();
    assert!(loaded.is_empty());
}

#[tokio::test]
async fn restored_running_and_starting_tasks_are_forced_to_failed() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = PersistenceAdapter::new(dir.path().join("background-tasks.json"));

    let tasks = vec![task(TaskStatus::Running), task(TaskStatus::Starting), task(TaskStatus::Pending)];
    adapter.save(&tasks).await.unwrap();

    let loaded = adapter.load().await.unwrap();
    assert_eq!(loaded[0].status, TaskStatus::Failed);
    assert_eq!(loaded[0].error.as_deref(), Some("Task interrupted by process restart"));
    assert!(loaded[0].completed_at.is_some());
    assert_eq!(loaded[1].status, TaskStatus::Failed);
    assert_eq!(loaded[2].status, TaskStatus::Pending, "pending tasks were never started, nothing to recover");
}

#[tokio::test]
async fn save_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = PersistenceAdapter::new(dir.path().join("nested").join("deep").join("background-tasks.json"));
    adapter.save(&[task(TaskStatus::Completed)]).await.unwrap();
    assert!(adapter.path().exists());
}

#[tokio::test]
async fn save_leaves_no_temp_file_behind() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = PersistenceAdapter::new(dir.path().join("background-tasks.json"));
    adapter.save(&[task(TaskStatus::Completed)]).await.unwrap();
    assert!(!adapter.path().with_extension("json.tmp").exists());
}

#[tokio::test]
async fn malformed_document_surfaces_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("background-tasks.json");
    tokio::fs::write(&path, b"not json").await.unwrap();
    let adapter = PersistenceAdapter::new(path);
    assert!(adapter.load().await.is_err());
}
