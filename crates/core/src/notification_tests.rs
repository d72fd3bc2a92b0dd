// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::*;
use crate::config::ManagerConfig;

struct FlakySender {
    fail_first_n: AtomicUsize,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl NotificationSender for FlakySender {
    async fn send(&self, _parent_session_id: &str, _message: &NotificationMessage) -> Result<(), String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_first_n.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first_n.fetch_sub(1, Ordering::SeqCst);
            Err("transport hiccup".to_owned())
        } else {
            Ok(())
        }
    }
}

struct AlwaysFails;

#[async_trait]
impl NotificationSender for AlwaysFails {
    async fn send(&self, _parent_session_id: &str, _message: &NotificationMessage) -> Result<(), String> {
        Err("permanently down".to_owned())
    }
}

fn completed_task() -> Task {
    let mut task = Task::new("parent-1", "explorer", "d", "p", None, Arc::new(ManagerConfig::default()));
    task.status = TaskStatus::Completed;
    task.result = Some("Result".to_owned());
    task.completed_at = Some("2024-01-15T12:30:45.000Z".to_owned());
    task
}

#[tokio::test(start_paused = true)]
async fn success_on_first_attempt_emits_sent() {
    let events = Arc::new(EventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    events.subscribe_all(move |event| seen_clone.lock().unwrap().push(event.kind));

    let attempts = Arc::new(AtomicUsize::new(0));
    let sender = Arc::new(FlakySender { fail_first_n: AtomicUsize::new(0), attempts: attempts.clone() });
    let service = NotificationService::new(sender, events, 3, std::time::Duration::from_millis(10), 5, std::time::Duration::from_secs(30), 3);

    let result = service.notify("parent-1", &completed_task()).await;
    assert_eq!(result, NotificationState::Sent);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(*seen.lock().unwrap(), vec![EventKind::NotificationAttempt, EventKind::NotificationSent]);
}

#[tokio::test(start_paused = true)]
async fn retries_then_succeeds_within_the_attempt_budget() {
    let events = Arc::new(EventBus::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let sender = Arc::new(FlakySender { fail_first_n: AtomicUsize::new(2), attempts: attempts.clone() });
    let service = NotificationService::new(sender, events, 3, std::time::Duration::from_millis(5), 5, std::time::Duration::from_secs(30), 3);

    let result = service.notify("parent-1", &completed_task()).await;
    assert_eq!(result, NotificationState::Sent);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausting_all_retries_emits_failed() {
    let events = Arc::new(EventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    events.subscribe(EventKind::NotificationFailed, move |event| seen_clone.lock().unwrap().push(event.clone()));

    let sender = Arc::new(AlwaysFails);
    let service = NotificationService::new(sender, events, 2, std::time::Duration::from_millis(5), 5, std::time::Duration::from_secs(30), 3);

    let result = service.notify("parent-1", &completed_task()).await;
    assert_eq!(result, NotificationState::Failed);
    let failed = seen.lock().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].payload.attempt, Some(2));
}

#[tokio::test(start_paused = true)]
async fn open_breaker_short_circuits_without_calling_the_sender() {
    let events = Arc::new(EventBus::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let sender = Arc::new(FlakySender { fail_first_n: AtomicUsize::new(999), attempts: attempts.clone() });
    let service = NotificationService::new(sender, events, 0, std::time::Duration::from_millis(5), 1, std::time::Duration::from_secs(30), 3);

    let _ = service.notify("parent-1", &completed_task()).await;
    assert!(service.is_breaker_open());
    let before = attempts.load(Ordering::SeqCst);

    let result = service.notify("parent-1", &completed_task()).await;
    assert_eq!(result, NotificationState::Failed);
    assert_eq!(attempts.load(Ordering::SeqCst), before, "breaker open means the sender is never invoked again");
}
