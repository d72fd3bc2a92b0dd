// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronous, multi-subscriber fan-out of task lifecycle events.
//!
//! The bus never stores events — it is pure fan-out, invoked at the moment a
//! transition (or admission, notification, eviction) commits. Subscribers run
//! in registration order; a panicking subscriber is caught and logged so it
//! cannot take down the emitter or starve later subscribers.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::task::TaskStatus;

/// The kind of lifecycle event emitted by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Transition,
    Started,
    Completed,
    Failed,
    Cancelled,
    NotificationAttempt,
    NotificationSent,
    NotificationFailed,
}

/// Payload carried alongside the common event envelope fields.
#[derive(Debug, Clone, Default)]
pub struct EventPayload {
    pub from: Option<TaskStatus>,
    pub to: Option<TaskStatus>,
    pub attempt: Option<u32>,
    pub detail: Option<String>,
}

/// A single lifecycle event. Every event carries the task id, a millisecond
/// timestamp, and the task's `stateVersion` at the moment of emission, so
/// subscribers observe events for a given task in strict version order.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub kind: EventKind,
    pub task_id: String,
    pub timestamp_ms: u64,
    pub version: u64,
    pub payload: EventPayload,
}

impl TaskEvent {
    pub fn new(kind: EventKind, task_id: impl Into<String>, version: u64) -> Self {
        Self {
            kind,
            task_id: task_id.into(),
            timestamp_ms: now_ms(),
            version,
            payload: EventPayload::default(),
        }
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

type Subscriber = Arc<dyn Fn(&TaskEvent) + Send + Sync>;

/// Synchronous multi-subscriber event dispatcher.
#[derive(Default)]
pub struct EventBus {
    by_kind: Mutex<HashMap<EventKind, Vec<Subscriber>>>,
    wildcard: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a single event kind.
    pub fn subscribe(&self, kind: EventKind, handler: impl Fn(&TaskEvent) + Send + Sync + 'static) {
        self.by_kind.lock().unwrap_or_else(|e| e.into_inner()).entry(kind).or_default().push(Arc::new(handler));
    }

    /// Subscribe to every event kind.
    pub fn subscribe_all(&self, handler: impl Fn(&TaskEvent) + Send + Sync + 'static) {
        self.wildcard.lock().unwrap_or_else(|e| e.into_inner()).push(Arc::new(handler));
    }

    /// Fan out `event` to every matching subscriber, in registration order.
    /// Never blocks on subscriber state beyond the subscriber's own handler
    /// body, and never propagates a panicking subscriber to the caller.
    pub fn emit(&self, event: TaskEvent) {
        let targeted: Vec<Subscriber> = self
            .by_kind
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&event.kind)
            .cloned()
            .unwrap_or_default();
        let wild: Vec<Subscriber> = self.wildcard.lock().unwrap_or_else(|e| e.into_inner()).clone();

        for handler in targeted.iter().chain(wild.iter()) {
            let event = &event;
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                let msg = panic_message(&panic);
                tracing::warn!(task_id = %event.task_id, kind = ?event.kind, %msg, "event subscriber panicked");
            }
        }
    }

    /// Clear every registered subscriber. Used by tests to isolate state
    /// between scenarios.
    pub fn reset(&self) {
        self.by_kind.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.wildcard.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
