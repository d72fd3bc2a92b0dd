// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;

#[test]
fn subscribers_fire_in_registration_order() {
    let bus = EventBus::new();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let o1 = Arc::clone(&order);
    bus.subscribe(EventKind::Completed, move |_| o1.lock().unwrap().push(1));
    let o2 = Arc::clone(&order);
    bus.subscribe(EventKind::Completed, move |_| o2.lock().unwrap().push(2));

    bus.emit(TaskEvent::new(EventKind::Completed, "bg_00000000", 1));

    assert_eq!(*order.lock().unwrap(), vec![1, 2]);
}

#[test]
fn wildcard_subscriber_sees_every_kind() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    bus.subscribe_all(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    bus.emit(TaskEvent::new(EventKind::Created, "bg_00000000", 0));
    bus.emit(TaskEvent::new(EventKind::Started, "bg_00000000", 1));

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn untargeted_kind_does_not_fire() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    bus.subscribe(EventKind::Failed, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    bus.emit(TaskEvent::new(EventKind::Completed, "bg_00000000", 1));

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn panicking_subscriber_does_not_stop_later_subscribers() {
    let bus = EventBus::new();
    bus.subscribe(EventKind::Completed, |_| panic!("boom"));

    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    bus.subscribe(EventKind::Completed, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    bus.emit(TaskEvent::new(EventKind::Completed, "bg_00000000", 1));

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn reset_clears_all_subscribers() {
    let bus = EventBus::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    bus.subscribe_all(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    bus.reset();
    bus.emit(TaskEvent::new(EventKind::Completed, "bg_00000000", 1));

    assert_eq!(count.load(Ordering::SeqCst), 0);
}
