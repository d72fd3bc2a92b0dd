// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The host RPC contract the manager depends on, modeled as an async trait
//! in the same shape as the upstream HTTP client the daemon already uses: a
//! thin wrapper over a handful of JSON calls plus a status-event stream.
//! The concrete `reqwest`-backed implementation lives in the binary crate;
//! this crate only knows the trait, so tests can swap in a fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    pub parent_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptBody {
    pub agent: String,
    pub tools: PromptTools,
    pub parts: Vec<PromptPart>,
    pub system: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptTools {
    pub background_task: bool,
    pub task: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptPart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptRequest {
    pub session_id: String,
    pub body: PromptBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageInfo {
    pub role: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, rename = "modelID")]
    pub model_id: Option<String>,
    #[serde(default, rename = "providerID")]
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionMessage {
    pub info: MessageInfo,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatusKind {
    Idle,
    Busy,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatusProperties {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub status: SessionStatusKindWrapper,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatusKindWrapper {
    #[serde(rename = "type")]
    pub kind: SessionStatusKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStatusEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub properties: SessionStatusProperties,
}

/// The host operations the manager depends on. A transport implementation
/// (HTTP over `reqwest` in the binary crate) lives outside this crate; tests
/// use an in-memory fake.
#[async_trait]
pub trait HostClient: Send + Sync {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<CreateSessionResponse, anyhow::Error>;

    async fn send_prompt(&self, request: PromptRequest) -> Result<(), anyhow::Error>;

    async fn list_messages(&self, session_id: &str, directory: Option<&str>) -> Result<Vec<SessionMessage>, anyhow::Error>;

    async fn delete_session(&self, session_id: &str, directory: Option<&str>) -> Result<(), anyhow::Error>;

    /// Whether `session_id` (a parent session) still exists, used by the
    /// orphan sweep. Any transport error is treated as "gone".
    async fn session_exists(&self, session_id: &str) -> bool;

    /// Subscribe to the host's `session.status` event stream.
    fn status_events(&self) -> std::pin::Pin<Box<dyn Stream<Item = SessionStatusEvent> + Send>>;
}

/// Concatenate the text of `text`- and `reasoning`-type parts with a blank
/// line between each, the extraction rule used both for normal resolution
/// and as the best-effort fallback on extraction failure.
pub fn extract_last_assistant_message(messages: &[SessionMessage]) -> Option<String> {
    let last_assistant = messages.iter().rev().find(|message| message.info.role == "assistant")?;
    let joined = last_assistant
        .parts
        .iter()
        .filter(|part| part.kind == "text" || part.kind == "reasoning")
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(if joined.trim().is_empty() { "(No output)".to_owned() } else { joined })
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
