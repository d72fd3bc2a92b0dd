// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tool-surface handlers: `launch` / `retrieve` / `cancel`, a webhook the
//! host posts `session.status` events to, a system-prompt injection endpoint,
//! and a health probe. Thin translation only — every decision lives in
//! [`bgtask_core::manager`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use bgtask_core::health::HealthSnapshot;
use bgtask_core::host::SessionStatusEvent;
use bgtask_core::task::{now_epoch_ms, parse_iso8601_ms};
use bgtask_core::{Task, TaskStatus};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, TransportError};
use crate::state::AppState;

const WAIT_MODE_TIMEOUT: Duration = Duration::from_secs(30);
const RETRIEVE_DISCARD_HINT_THRESHOLD: usize = 5_000;

#[derive(Debug, Deserialize)]
pub struct LaunchRequest {
    /// The session that invoked the tool.
    pub session_id: String,
    /// The agent persona the calling session is running as.
    pub caller_agent: String,
    pub description: String,
    pub prompt: String,
    pub agent: String,
    #[serde(default)]
    pub wait: bool,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LaunchResponse {
    pub task_id: String,
    pub text: String,
}

pub async fn launch(State(state): State<Arc<AppState>>, Json(req): Json<LaunchRequest>) -> Result<Json<LaunchResponse>, ApiError> {
    let task = state
        .manager
        .launch(&req.session_id, &req.caller_agent, &req.agent, &req.description, &req.prompt, req.model)
        .await?;

    if !req.wait {
        return Ok(Json(LaunchResponse { task_id: task.id.clone(), text: task.id }));
    }

    let text = match state.manager.wait_for_completion(&task.id, WAIT_MODE_TIMEOUT).await {
        Some(terminal) if terminal.status.is_terminal() => format_task_block(&terminal),
        _ => format!("Task {} is still running; it will notify this session on completion.", task.id),
    };
    Ok(Json(LaunchResponse { task_id: task.id, text }))
}

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub text: String,
}

pub async fn retrieve(State(state): State<Arc<AppState>>, Json(req): Json<RetrieveRequest>) -> Result<Json<RetrieveResponse>, ApiError> {
    let task = state.manager.retrieve(&req.task_id).await?;
    Ok(Json(RetrieveResponse { text: format_task_block(&task) }))
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub text: String,
}

pub async fn cancel(State(state): State<Arc<AppState>>, Json(req): Json<CancelRequest>) -> axum::response::Response {
    if !req.all && req.task_id.is_none() {
        return TransportError::BadRequest.into_response("must set either task_id or all");
    }
    let target = if req.all { None } else { req.task_id };
    let count = state.manager.cancel(target.clone()).await;
    let text = match target {
        Some(id) if count == 1 => format!("Cancelled task {id}."),
        Some(id) => format!("Task {id} was not cancelled (already terminal or unknown)."),
        None => format!("Cancelled {count} task(s)."),
    };
    Json(CancelResponse { text }).into_response()
}

#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(flatten)]
    pub event: SessionStatusEvent,
}

pub async fn session_status_webhook(State(state): State<Arc<AppState>>, Json(body): Json<WebhookBody>) -> impl IntoResponse {
    state.host_client.publish_status_event(body.event.clone());
    state.manager.on_session_status(body.event).await;
    axum::http::StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct SystemPromptRequest {
    pub parent_session_id: String,
    #[serde(default)]
    pub system: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SystemPromptResponse {
    pub system: Vec<String>,
}

/// Called by the host just before it assembles a prompt body for the parent
/// session, to splice in the `<BackgroundTasks>` block if there's anything to
/// report.
pub async fn system_prompt(State(state): State<Arc<AppState>>, Json(mut req): Json<SystemPromptRequest>) -> Json<SystemPromptResponse> {
    state.manager.inject_background_tasks_block(&req.parent_session_id, &mut req.system).await;
    Json(SystemPromptResponse { system: req.system })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub paused: bool,
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse { ok: true, paused: state.manager.is_paused().await, snapshot: state.manager.health().await })
}

/// Render the retrieve/wait-mode result block: id, status, description,
/// duration, result size, optional truncation notice, and payload.
fn format_task_block(task: &Task) -> String {
    let duration_secs = task_duration_secs(task);
    let payload = match task.status {
        TaskStatus::Completed => task.result.clone().unwrap_or_default(),
        TaskStatus::Failed => task.error.clone().unwrap_or_default(),
        TaskStatus::Cancelled => task.result.clone().unwrap_or_else(|| "(Task cancelled)".to_owned()),
        TaskStatus::Pending | TaskStatus::Starting | TaskStatus::Running => String::new(),
    };

    let mut block = format!(
        "Task: {}\nStatus: {:?}\nDescription: {}\nDuration: {}s\nResult size: {} bytes",
        task.id,
        task.status,
        task.description,
        duration_secs,
        payload.len(),
    );
    if task.is_result_truncated {
        block.push_str("\n(output truncated to the size cap)");
    }
    block.push_str("\n\n");
    block.push_str(&payload);
    if payload.len() > RETRIEVE_DISCARD_HINT_THRESHOLD {
        block.push_str("\n\n(Discard this output from context once you've extracted what you need.)");
    }
    block
}

fn task_duration_secs(task: &Task) -> u64 {
    let started = task.started_at.as_deref().and_then(parse_iso8601_ms);
    let completed = task.completed_at.as_deref().and_then(parse_iso8601_ms).unwrap_or_else(now_epoch_ms);
    match started {
        Some(started_ms) if completed >= started_ms => (completed - started_ms) / 1000,
        _ => 0,
    }
}
