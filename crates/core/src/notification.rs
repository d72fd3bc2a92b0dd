// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort completion notification, retried under circuit-breaker
//! protection. The actual transport is an injected [`NotificationSender`] —
//! this service never talks to the host directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::breaker::{BreakerError, CircuitBreaker};
use crate::event::{EventBus, EventKind, EventPayload, TaskEvent};
use crate::task::{NotificationState, Task, TaskStatus};

/// The structured completion message injected into the parent session.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl NotificationMessage {
    pub fn from_task(task: &Task) -> Self {
        Self {
            kind: "background-task-completed",
            task_id: task.id.clone(),
            status: task.status,
            result: task.result.clone(),
            error: task.error.clone(),
            truncated: task.is_result_truncated,
            completed_at: task.completed_at.clone(),
        }
    }
}

/// Delivers a [`NotificationMessage`] into a parent session. Implemented over
/// the host client in the binary; swapped for a recording fake in tests.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, parent_session_id: &str, message: &NotificationMessage) -> Result<(), String>;
}

pub struct NotificationService {
    sender: Arc<dyn NotificationSender>,
    events: Arc<EventBus>,
    breaker: CircuitBreaker,
    retry_attempts: u32,
    retry_base: Duration,
}

impl NotificationService {
    pub fn new(
        sender: Arc<dyn NotificationSender>,
        events: Arc<EventBus>,
        retry_attempts: u32,
        retry_base: Duration,
        breaker_failure_threshold: u32,
        breaker_recovery_timeout: Duration,
        breaker_half_open_max_calls: u32,
    ) -> Self {
        Self {
            sender,
            events,
            breaker: CircuitBreaker::new(breaker_failure_threshold, breaker_recovery_timeout, breaker_half_open_max_calls),
            retry_attempts,
            retry_base,
        }
    }

    pub fn is_breaker_open(&self) -> bool {
        self.breaker.is_open()
    }

    /// Build the completion message for `task`, attempt delivery with
    /// exponential-backoff retries inside the breaker, and return the
    /// resulting [`NotificationState`] for the caller to persist.
    pub async fn notify(&self, parent_session_id: &str, task: &Task) -> NotificationState {
        let message = NotificationMessage::from_task(task);
        self.events.emit(TaskEvent::new(EventKind::NotificationAttempt, &task.id, task.state_version));

        let sender = self.sender.clone();
        let parent = parent_session_id.to_owned();
        let attempts = self.retry_attempts;
        let base = self.retry_base;
        let message_for_call = message.clone();

        let result = self
            .breaker
            .call(move || send_with_retries(sender, parent, message_for_call, attempts, base))
            .await;

        match result {
            Ok(()) => {
                info!(task_id = %task.id, "notification sent");
                self.events.emit(TaskEvent::new(EventKind::NotificationSent, &task.id, task.state_version));
                NotificationState::Sent
            }
            Err(err) => {
                let detail = match &err {
                    BreakerError::Open => "circuit breaker open".to_owned(),
                    BreakerError::Inner(reason) => reason.clone(),
                };
                warn!(task_id = %task.id, reason = %detail, "notification delivery failed");
                self.events.emit(
                    TaskEvent::new(EventKind::NotificationFailed, &task.id, task.state_version)
                        .with_payload(EventPayload { attempt: Some(attempts), detail: Some(detail), ..Default::default() }),
                );
                NotificationState::Failed
            }
        }
    }
}

async fn send_with_retries(
    sender: Arc<dyn NotificationSender>,
    parent_session_id: String,
    message: NotificationMessage,
    attempts: u32,
    base: Duration,
) -> Result<(), String> {
    let mut last_err = String::from("no attempts made");
    for attempt in 0..=attempts {
        match sender.send(&parent_session_id, &message).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_err = err;
                if attempt < attempts {
                    tokio::time::sleep(base * 2u32.pow(attempt)).await;
                }
            }
        }
    }
    Err(last_err)
}

#[cfg(test)]
#[path = "notification_tests.rs"]
mod tests;
