// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Finalization saga: an ordered sequence of steps with per-step
//! compensation, run once a task reaches a terminal outcome.
//!
//! Each step reports failure as `Err`, never by panicking — the Rust
//! equivalent of "any thrown exception in saga wiring is caught and logged,
//! not propagated" is simply that [`Saga::run`] never returns an error to
//! its caller; a failing step is recorded in the outcome and triggers
//! reverse-order compensation of every step that already succeeded.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("saga step {step} failed: {reason}")]
pub struct SagaError {
    pub step: String,
    pub reason: String,
}

/// One step of a saga. `execute` performs the forward action; `compensate`
/// undoes it and is only invoked for steps that previously succeeded, in
/// reverse order, when a later step fails.
#[async_trait]
pub trait SagaStep: Send {
    fn name(&self) -> &'static str;
    async fn execute(&mut self) -> Result<(), String>;
    async fn compensate(&mut self) {}
}

/// A step built from a pair of closures, for wiring up saga steps inline
/// without a dedicated type per step.
pub struct ClosureStep {
    name: &'static str,
    execute: Box<dyn FnMut() -> BoxFuture<'static, Result<(), String>> + Send>,
    compensate: Box<dyn FnMut() -> BoxFuture<'static, ()> + Send>,
}

impl ClosureStep {
    pub fn new(
        name: &'static str,
        execute: impl FnMut() -> BoxFuture<'static, Result<(), String>> + Send + 'static,
        compensate: impl FnMut() -> BoxFuture<'static, ()> + Send + 'static,
    ) -> Self {
        Self { name, execute: Box::new(execute), compensate: Box::new(compensate) }
    }

    /// A step with no meaningful undo, e.g. because the action it performs
    /// is idempotent cleanup.
    pub fn without_compensation(
        name: &'static str,
        execute: impl FnMut() -> BoxFuture<'static, Result<(), String>> + Send + 'static,
    ) -> Self {
        Self::new(name, execute, || Box::pin(async {}))
    }

    /// A step that never fails: its `execute` swallows its own errors and
    /// always reports success, e.g. best-effort notification delivery.
    pub fn best_effort(
        name: &'static str,
        mut execute: impl FnMut() -> BoxFuture<'static, Result<(), String>> + Send + 'static,
    ) -> Self {
        Self::without_compensation(name, move || {
            let fut = execute();
            Box::pin(async move {
                if let Err(reason) = fut.await {
                    warn!(step = name, %reason, "best-effort saga step failed, proceeding anyway");
                }
                Ok(())
            })
        })
    }
}

#[async_trait]
impl SagaStep for ClosureStep {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn execute(&mut self) -> Result<(), String> {
        (self.execute)().await
    }

    async fn compensate(&mut self) {
        (self.compensate)().await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SagaOutcome {
    pub failed_step: Option<String>,
    pub failure_reason: Option<String>,
}

impl SagaOutcome {
    pub fn succeeded(&self) -> bool {
        self.failed_step.is_none()
    }
}

#[derive(Default)]
pub struct Saga {
    steps: Vec<Box<dyn SagaStep>>,
}

impl Saga {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(mut self, step: Box<dyn SagaStep>) -> Self {
        self.steps.push(step);
        self
    }

    /// Run every step in order. On the first failure, compensate completed
    /// steps in reverse order and stop; later steps never run.
    pub async fn run(mut self) -> SagaOutcome {
        let mut completed = Vec::new();
        for idx in 0..self.steps.len() {
            match self.steps[idx].execute().await {
                Ok(()) => completed.push(idx),
                Err(reason) => {
                    let name = self.steps[idx].name();
                    warn!(step = name, %reason, "saga step failed, compensating prior steps");
                    for &done in completed.iter().rev() {
                        self.steps[done].compensate().await;
                    }
                    return SagaOutcome { failed_step: Some(name.to_owned()), failure_reason: Some(reason) };
                }
            }
        }
        SagaOutcome::default()
    }
}

#[cfg(test)]
#[path = "saga_tests.rs"]
mod tests;
