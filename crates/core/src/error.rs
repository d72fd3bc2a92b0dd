// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified error taxonomy for the background task manager.
//!
//! Validation errors are synchronous, raised at the launch/retrieve boundary.
//! Everything past that boundary is represented as a leaf error from the
//! component that raised it and wrapped here for the tool-surface layer.

use thiserror::Error;

use crate::saga::SagaError;
use crate::state_machine::TransitionError;

/// Top-level error returned from any manager-facing operation.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("invalid agent: {0}")]
    InvalidAgent(String),

    #[error("agent {0} is read-only and cannot launch background tasks")]
    ReadOnlyAgent(String),

    #[error("background tasks cannot launch nested background tasks")]
    NestedLaunch,

    #[error("task manager is paused")]
    Paused,

    #[error("malformed task id: {0}")]
    InvalidTaskId(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("task {0} has not finished yet; stop polling, wait for notification")]
    NonTerminalTask(String),

    #[error("host transport error: {0}")]
    HostTransport(#[source] anyhow::Error),

    #[error("state machine error: {0}")]
    StateMachine(#[from] TransitionError),

    #[error("saga error: {0}")]
    Saga(#[from] SagaError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl ManagerError {
    /// HTTP status the thin tool-surface binary should respond with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidAgent(_) => 400,
            Self::ReadOnlyAgent(_) => 400,
            Self::NestedLaunch => 409,
            Self::Paused => 503,
            Self::InvalidTaskId(_) => 400,
            Self::UnknownTask(_) => 404,
            Self::NonTerminalTask(_) => 409,
            Self::HostTransport(_) => 502,
            Self::StateMachine(_) => 409,
            Self::Saga(_) => 500,
            Self::Persistence(_) => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidAgent(_) => "INVALID_AGENT",
            Self::ReadOnlyAgent(_) => "READ_ONLY_AGENT",
            Self::NestedLaunch => "NESTED_LAUNCH",
            Self::Paused => "PAUSED",
            Self::InvalidTaskId(_) => "INVALID_TASK_ID",
            Self::UnknownTask(_) => "UNKNOWN_TASK",
            Self::NonTerminalTask(_) => "NON_TERMINAL_TASK",
            Self::HostTransport(_) => "HOST_TRANSPORT",
            Self::StateMachine(_) => "STATE_MACHINE",
            Self::Saga(_) => "SAGA",
            Self::Persistence(_) => "PERSISTENCE",
        }
    }
}

/// Errors raised by the persistence adapter.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read state file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },

    #[error("failed to write state file {path}: {source}")]
    Write { path: String, #[source] source: std::io::Error },

    #[error("failed to serialize task table: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
