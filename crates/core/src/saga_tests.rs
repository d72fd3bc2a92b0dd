// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;

fn ok_step(name: &'static str, calls: Arc<AtomicUsize>) -> ClosureStep {
    ClosureStep::without_compensation(name, move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    })
}

fn failing_step(name: &'static str, reason: &'static str) -> ClosureStep {
    ClosureStep::without_compensation(name, move || Box::pin(async move { Err(reason.to_owned()) }))
}

#[tokio::test]
async fn all_steps_succeed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let saga = Saga::new().add_step(Box::new(ok_step("a", calls.clone()))).add_step(Box::new(ok_step("b", calls.clone())));
    let outcome = saga.run().await;
    assert!(outcome.succeeded());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failure_reports_the_failing_step_and_stops_the_chain() {
    let calls = Arc::new(AtomicUsize::new(0));
    let saga = Saga::new()
        .add_step(Box::new(ok_step("extract-result", calls.clone())))
        .add_step(Box::new(failing_step("send-notification", "transport down")))
        .add_step(Box::new(ok_step("release-resources", calls.clone())));

    let outcome = saga.run().await;
    assert!(!outcome.succeeded());
    assert_eq!(outcome.failed_step.as_deref(), Some("send-notification"));
    assert_eq!(outcome.failure_reason.as_deref(), Some("transport down"));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "release-resources must not run after an earlier failure");
}

#[tokio::test]
async fn failure_compensates_completed_steps_in_reverse_order() {
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let step_a = {
        let order = order.clone();
        ClosureStep::new(
            "a",
            || Box::pin(async { Ok(()) }),
            move || {
                let order = order.clone();
                Box::pin(async move { order.lock().unwrap().push("a") })
            },
        )
    };
    let step_b = {
        let order = order.clone();
        ClosureStep::new(
            "b",
            || Box::pin(async { Ok(()) }),
            move || {
                let order = order.clone();
                Box::pin(async move { order.lock().unwrap().push("b") })
            },
        )
    };
    let step_c = ClosureStep::new("c", || Box::pin(async { Err("boom".to_owned()) }), || Box::pin(async {}));

    let saga = Saga::new().add_step(Box::new(step_a)).add_step(Box::new(step_b)).add_step(Box::new(step_c));
    let outcome = saga.run().await;

    assert!(!outcome.succeeded());
    assert_eq!(*order.lock().unwrap(), vec!["b", "a"]);
}

#[tokio::test]
async fn best_effort_step_never_fails_the_saga() {
    let saga = Saga::new().add_step(Box::new(ClosureStep::best_effort("send-notification", || {
        Box::pin(async { Err("host unreachable".to_owned()) })
    })));
    let outcome = saga.run().await;
    assert!(outcome.succeeded());
}
