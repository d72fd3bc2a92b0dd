// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::config::ManagerConfig;

fn task_with(status: TaskStatus, started_at: Option<&str>) -> Task {
    let mut task = Task::new("parent-1", "explorer", "d", "p", None, Arc::new(ManagerConfig::default()));
    task.status = status;
    task.started_at = started_at.map(str::to_owned);
    task
}

#[test]
fn tallies_by_status() {
    let tasks = vec![
        task_with(TaskStatus::Running, None),
        task_with(TaskStatus::Running, None),
        task_with(TaskStatus::Completed, None),
    ];
    let counts = counts_by_status(tasks.iter());
    assert_eq!(counts.get(&TaskStatus::Running), Some(&2));
    assert_eq!(counts.get(&TaskStatus::Completed), Some(&1));
    assert_eq!(counts.get(&TaskStatus::Failed), None);
}

#[test]
fn oldest_non_terminal_picks_the_longest_running_task() {
    let tasks = vec![task_with(TaskStatus::Running, Some("a")), task_with(TaskStatus::Starting, Some("b"))];
    let parse = |started: &str| -> Option<u64> {
        match started {
            "a" => Some(1_000),
            "b" => Some(9_000),
            _ => None,
        }
    };
    let age = oldest_non_terminal_age_ms(tasks.iter(), 10_000, parse);
    assert_eq!(age, Some(9_000), "task a started earlier (ts 1000) so it is older at now=10000");
}

#[test]
fn terminal_tasks_are_excluded_from_the_oldest_query() {
    let tasks = vec![task_with(TaskStatus::Completed, Some("a"))];
    let age = oldest_non_terminal_age_ms(tasks.iter(), 10_000, |_| Some(0));
    assert_eq!(age, None);
}

#[test]
fn empty_task_set_has_no_oldest_age() {
    let tasks: Vec<Task> = Vec::new();
    let age = oldest_non_terminal_age_ms(tasks.iter(), 10_000, |_| Some(0));
    assert_eq!(age, None);
}
