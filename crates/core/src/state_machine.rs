// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table-driven task state machine.
//!
//! Transition hooks run synchronously over the task record; any suspending
//! side effect (deleting a session, sending a notification) is orchestrated
//! by the caller around the transition rather than inside a hook, since the
//! manager's suspension points are already explicit in the start/finalize
//! flows. This keeps `transition` itself a single atomic step with respect
//! to `stateVersion`.
//!
//! Every successful transition emits a `task.transition` event on the shared
//! event bus carrying `from`/`to`/`version`; a transition that lands on a
//! terminal status additionally emits the matching `Completed`/`Failed`/
//! `Cancelled` event, since those are the fan-out the metrics collector
//! depends on, and every `state_version` a caller can observe should map
//! back to exactly one such event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::event::{EventBus, EventKind, EventPayload, TaskEvent};
use crate::task::{Task, TaskStatus};

pub type Hook = Box<dyn Fn(&mut Task) -> Result<(), String> + Send + Sync>;

pub struct Rule {
    pub allowed: Vec<TaskStatus>,
    pub terminal: bool,
    pub timeout: Option<Duration>,
    pub recovery: Option<TaskStatus>,
    pub on_exit: Option<Hook>,
    pub on_enter: Option<Hook>,
}

impl Default for Rule {
    fn default() -> Self {
        Self { allowed: Vec::new(), terminal: false, timeout: None, recovery: None, on_exit: None, on_enter: None }
    }
}

/// Context applied to the task on a successful transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    pub result: Option<String>,
    pub error: Option<String>,
    pub truncated: Option<bool>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot transition from {from:?} to {to:?}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("exit hook failed: {0}")]
    ExitHookFailed(String),
    #[error("enter hook failed: {0}")]
    EnterHookFailed(String),
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u64, found: u64 },
}

/// The default transition table described in the component design: pending
/// may go to starting or cancelled; starting to running, failed, or
/// cancelled; running to completed, failed, or cancelled; the three
/// terminal states accept nothing further.
pub struct StateMachine {
    table: HashMap<TaskStatus, Rule>,
    events: Arc<EventBus>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(Arc::new(EventBus::new()))
    }
}

impl StateMachine {
    /// Build the default transition table, fanning out transition/terminal
    /// events onto `events` as they commit.
    pub fn new(events: Arc<EventBus>) -> Self {
        let mut table = HashMap::new();
        table.insert(
            TaskStatus::Pending,
            Rule {
                allowed: vec![TaskStatus::Starting, TaskStatus::Cancelled],
                timeout: Some(Duration::from_secs(60)),
                recovery: Some(TaskStatus::Cancelled),
                ..Default::default()
            },
        );
        table.insert(
            TaskStatus::Starting,
            Rule {
                allowed: vec![TaskStatus::Running, TaskStatus::Failed, TaskStatus::Cancelled],
                timeout: Some(Duration::from_secs(30)),
                recovery: Some(TaskStatus::Failed),
                ..Default::default()
            },
        );
        table.insert(
            TaskStatus::Running,
            Rule {
                allowed: vec![TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled],
                timeout: Some(Duration::from_secs(30 * 60)),
                recovery: Some(TaskStatus::Failed),
                ..Default::default()
            },
        );
        table.insert(TaskStatus::Completed, Rule { terminal: true, ..Default::default() });
        table.insert(TaskStatus::Failed, Rule { terminal: true, ..Default::default() });
        table.insert(TaskStatus::Cancelled, Rule { terminal: true, ..Default::default() });
        Self { table, events }
    }

    /// Emit the `task.transition` event plus, if `to` is terminal, the
    /// matching `Completed`/`Failed`/`Cancelled` event — both stamped with
    /// the task's current (post-commit) `state_version`.
    fn emit_transition(&self, task: &Task, from: TaskStatus, to: TaskStatus) {
        let payload = EventPayload { from: Some(from), to: Some(to), ..Default::default() };
        self.events.emit(TaskEvent::new(EventKind::Transition, &task.id, task.state_version).with_payload(payload.clone()));

        let terminal_kind = match to {
            TaskStatus::Completed => Some(EventKind::Completed),
            TaskStatus::Failed => Some(EventKind::Failed),
            TaskStatus::Cancelled => Some(EventKind::Cancelled),
            _ => None,
        };
        if let Some(kind) = terminal_kind {
            self.events.emit(TaskEvent::new(kind, &task.id, task.state_version).with_payload(payload));
        }
    }
}

impl StateMachine {
    pub fn rule(&self, status: TaskStatus) -> Option<&Rule> {
        self.table.get(&status)
    }

    /// Install an `on_exit` hook for `from`. Intended for test/assembly time,
    /// before the state machine is shared across tasks.
    pub fn set_on_exit(&mut self, from: TaskStatus, hook: Hook) {
        self.table.entry(from).or_default().on_exit = Some(hook);
    }

    /// Install an `on_enter` hook for `to`.
    pub fn set_on_enter(&mut self, to: TaskStatus, hook: Hook) {
        self.table.entry(to).or_default().on_enter = Some(hook);
    }

    /// Attempt to transition `task` to `target`, applying `context` on
    /// success. Returns the new version on success.
    pub fn transition(
        &self,
        task: &mut Task,
        target: TaskStatus,
        context: TransitionContext,
    ) -> Result<u64, TransitionError> {
        let from = task.status;
        let rule = self.table.get(&from).ok_or(TransitionError::InvalidTransition { from, to: target })?;

        if !rule.allowed.contains(&target) {
            return Err(TransitionError::InvalidTransition { from, to: target });
        }

        let expected_version = task.state_version;
        if let Some(hook) = &rule.on_exit {
            hook(task).map_err(TransitionError::ExitHookFailed)?;
        }

        // CAS: if the exit hook (or anything racing it) advanced the version
        // underneath us, refuse rather than silently overwrite newer state.
        if task.state_version != expected_version {
            return Err(TransitionError::VersionMismatch { expected: expected_version, found: task.state_version });
        }

        task.status = target;
        task.state_version += 1;
        if let Some(result) = context.result {
            task.result = Some(result);
        }
        if let Some(error) = context.error {
            task.error = Some(error);
        }
        if let Some(truncated) = context.truncated {
            task.is_result_truncated = truncated;
        }

        if let Some(target_rule) = self.table.get(&target) {
            if let Some(hook) = &target_rule.on_enter {
                if let Err(message) = hook(task) {
                    if let Some(recovery) = target_rule.recovery.filter(|r| *r != target) {
                        task.status = recovery;
                        task.state_version += 1;
                        task.error = Some(format!("enter hook failed, recovered to {recovery:?}: {message}"));
                        self.emit_transition(task, from, recovery);
                    }
                    return Err(TransitionError::EnterHookFailed(message));
                }
            }
        }

        self.emit_transition(task, from, target);
        Ok(task.state_version)
    }
}

#[cfg(test)]
#[path = "state_machine_tests.rs"]
mod tests;
