// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::{Arc, Mutex};

use super::*;
use crate::config::ManagerConfig;

fn task() -> Task {
    Task::new("parent-1", "reviewer", "d", "p", None, Arc::new(ManagerConfig::default()))
}

#[test]
fn pending_to_starting_advances_version() {
    let machine = StateMachine::default();
    let mut t = task();
    let version = machine.transition(&mut t, TaskStatus::Starting, TransitionContext::default()).unwrap();
    assert_eq!(version, 1);
    assert_eq!(t.status, TaskStatus::Starting);
}

#[test]
fn completed_is_terminal() {
    let machine = StateMachine::default();
    let mut t = task();
    machine.transition(&mut t, TaskStatus::Starting, TransitionContext::default()).unwrap();
    machine.transition(&mut t, TaskStatus::Running, TransitionContext::default()).unwrap();
    machine.transition(&mut t, TaskStatus::Completed, TransitionContext { result: Some("ok".into()), ..Default::default() }).unwrap();

    let err = machine.transition(&mut t, TaskStatus::Running, TransitionContext::default()).unwrap_err();
    assert!(matches!(err, TransitionError::InvalidTransition { from: TaskStatus::Completed, to: TaskStatus::Running }));
}

#[test]
fn skipping_a_state_is_rejected() {
    let machine = StateMachine::default();
    let mut t = task();
    let err = machine.transition(&mut t, TaskStatus::Completed, TransitionContext::default()).unwrap_err();
    assert!(matches!(err, TransitionError::InvalidTransition { from: TaskStatus::Pending, to: TaskStatus::Completed }));
}

#[test]
fn context_fields_are_applied_on_success() {
    let machine = StateMachine::default();
    let mut t = task();
    machine.transition(&mut t, TaskStatus::Starting, TransitionContext::default()).unwrap();
    machine.transition(&mut t, TaskStatus::Running, TransitionContext::default()).unwrap();
    machine
        .transition(
            &mut t,
            TaskStatus::Failed,
            TransitionContext { error: Some("boom".into()), ..Default::default() },
        )
        .unwrap();
    assert_eq!(t.error.as_deref(), Some("boom"));
    assert_eq!(t.status, TaskStatus::Failed);
}

#[test]
fn failing_exit_hook_leaves_task_in_prior_state() {
    let mut machine = StateMachine::default();
    machine.set_on_exit(TaskStatus::Pending, Box::new(|_task| Err("exit boom".to_owned())));
    let mut t = task();
    let err = machine.transition(&mut t, TaskStatus::Starting, TransitionContext::default()).unwrap_err();
    assert!(matches!(err, TransitionError::ExitHookFailed(message) if message == "exit boom"));
    assert_eq!(t.status, TaskStatus::Pending);
    assert_eq!(t.state_version, 0);
}

#[test]
fn failing_enter_hook_recovers_to_the_configured_state() {
    let mut machine = StateMachine::default();
    machine.set_on_enter(TaskStatus::Starting, Box::new(|_task| Err("enter boom".to_owned())));
    let mut t = task();
    let err = machine.transition(&mut t, TaskStatus::Starting, TransitionContext::default()).unwrap_err();
    assert!(matches!(err, TransitionError::EnterHookFailed(message) if message == "enter boom"));
    assert_eq!(t.status, TaskStatus::Failed, "starting's configured recovery state is failed");
    assert_eq!(t.state_version, 2, "one bump for the attempted transition, one for the recovery");
}

#[test]
fn successful_transition_emits_a_transition_event() {
    let events = Arc::new(EventBus::new());
    let seen: Arc<Mutex<Vec<(EventKind, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    events.subscribe(EventKind::Transition, move |event| recorder.lock().unwrap().push((event.kind, event.version)));

    let machine = StateMachine::new(events);
    let mut t = task();
    machine.transition(&mut t, TaskStatus::Starting, TransitionContext::default()).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(EventKind::Transition, 1)]);
}

#[test]
fn terminal_transition_also_emits_the_matching_terminal_event() {
    let events = Arc::new(EventBus::new());
    let seen: Arc<Mutex<Vec<EventKind>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    events.subscribe_all(move |event| recorder.lock().unwrap().push(event.kind));

    let machine = StateMachine::new(events);
    let mut t = task();
    machine.transition(&mut t, TaskStatus::Starting, TransitionContext::default()).unwrap();
    machine.transition(&mut t, TaskStatus::Running, TransitionContext::default()).unwrap();
    machine.transition(&mut t, TaskStatus::Failed, TransitionContext { error: Some("boom".into()), ..Default::default() }).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![EventKind::Transition, EventKind::Transition, EventKind::Transition, EventKind::Failed]);
}

#[test]
fn enter_hook_recovery_emits_the_recovery_transition_not_the_rejected_target() {
    let events = Arc::new(EventBus::new());
    let seen: Arc<Mutex<Vec<(TaskStatus, TaskStatus)>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    events.subscribe(EventKind::Transition, move |event| recorder.lock().unwrap().push((event.payload.from.unwrap(), event.payload.to.unwrap())));

    let mut machine = StateMachine::new(events);
    machine.set_on_enter(TaskStatus::Starting, Box::new(|_task| Err("enter boom".to_owned())));
    let mut t = task();
    machine.transition(&mut t, TaskStatus::Starting, TransitionContext::default()).unwrap_err();

    assert_eq!(*seen.lock().unwrap(), vec![(TaskStatus::Pending, TaskStatus::Failed)]);
}
