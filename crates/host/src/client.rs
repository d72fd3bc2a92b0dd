// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `reqwest`-backed [`HostClient`] implementation talking to the
//! coding-assistant host's session RPC surface. `session.status` events do
//! not arrive over this same HTTP connection — the host posts them to this
//! binary's webhook endpoint, which republishes them on [`HttpHostClient`]'s
//! broadcast channel; [`HttpHostClient::status_events`] just subscribes.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bgtask_core::host::{
    CreateSessionRequest, CreateSessionResponse, HostClient, PromptRequest, SessionMessage, SessionStatusEvent,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const STATUS_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Thin HTTP wrapper over the host's `session.*` JSON-RPC surface: one base
/// URL, one optional bearer token, same shape as the mux crate's upstream
/// client.
pub struct HttpHostClient {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
    status_tx: broadcast::Sender<SessionStatusEvent>,
}

impl HttpHostClient {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let (status_tx, _) = broadcast::channel(STATUS_EVENT_CHANNEL_CAPACITY);
        Ok(Self { base_url: base_url.into(), auth_token, client, status_tx })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Called by the webhook handler when the host posts a `session.status`
    /// event; fans it out to every subscribed `status_events()` stream.
    /// Dropped silently if nobody is currently subscribed.
    pub fn publish_status_event(&self, event: SessionStatusEvent) {
        let _ = self.status_tx.send(event);
    }
}

#[derive(serde::Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[async_trait]
impl HostClient for HttpHostClient {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<CreateSessionResponse, anyhow::Error> {
        let resp = self
            .apply_auth(self.client.post(self.url("/session.create")).json(&request))
            .send()
            .await?
            .error_for_status()?;
        let envelope: DataEnvelope<CreateSessionResponse> = resp.json().await?;
        Ok(envelope.data)
    }

    async fn send_prompt(&self, request: PromptRequest) -> Result<(), anyhow::Error> {
        self.apply_auth(self.client.post(self.url("/session.prompt")).json(&request))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_messages(&self, session_id: &str, directory: Option<&str>) -> Result<Vec<SessionMessage>, anyhow::Error> {
        let mut req = self.client.get(self.url("/session.messages")).query(&[("sessionId", session_id)]);
        if let Some(dir) = directory {
            req = req.query(&[("directory", dir)]);
        }
        let resp = self.apply_auth(req).send().await?.error_for_status()?;
        let envelope: DataEnvelope<Vec<SessionMessage>> = resp.json().await?;
        Ok(envelope.data)
    }

    async fn delete_session(&self, session_id: &str, directory: Option<&str>) -> Result<(), anyhow::Error> {
        let body = serde_json::json!({ "sessionId": session_id, "directory": directory });
        self.apply_auth(self.client.post(self.url("/session.delete")).json(&body))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn session_exists(&self, session_id: &str) -> bool {
        let req = self.client.get(self.url("/session.status")).query(&[("sessionId", session_id)]);
        matches!(self.apply_auth(req).send().await, Ok(resp) if resp.status().is_success())
    }

    fn status_events(&self) -> Pin<Box<dyn Stream<Item = SessionStatusEvent> + Send>> {
        let stream = BroadcastStream::new(self.status_tx.subscribe()).filter_map(|item| item.ok());
        Box::pin(stream)
    }
}
