// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test doubles shared across this crate's test modules and the integration
//! test under `tests/`. An in-memory `HostClient` and a recording
//! `NotificationSender`, scripted rather than networked.

use std::collections::{HashMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_stream::Stream;

use crate::host::{CreateSessionRequest, CreateSessionResponse, HostClient, PromptRequest, SessionMessage, SessionStatusEvent};
use crate::notification::{NotificationMessage, NotificationSender};

/// A scripted, in-memory [`HostClient`]. Sessions are named sequentially
/// (`s1`, `s2`, ...) unless a fixed set of ids is pushed via
/// [`MockHostClient::with_session_ids`]. `list_messages` returns whatever was
/// queued with [`MockHostClient::push_messages`] for that session, defaulting
/// to empty. Failures are injected with the `set_fail_*` setters.
#[derive(Default)]
pub struct MockHostClient {
    inner: Mutex<Inner>,
    next_session_seq: AtomicU64,
}

#[derive(Default)]
struct Inner {
    created_sessions: Vec<CreateSessionRequest>,
    sent_prompts: Vec<PromptRequest>,
    deleted_sessions: Vec<String>,
    existing_sessions: HashSet<String>,
    queued_session_ids: VecDeque<String>,
    messages_by_session: HashMap<String, Vec<SessionMessage>>,
    list_messages_calls: HashMap<String, u64>,
    fail_create: bool,
    fail_send_prompt: bool,
    fail_list_messages: bool,
}

impl MockHostClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_ids(self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.queued_session_ids.extend(ids.into_iter().map(Into::into));
        }
        self
    }

    pub fn push_messages(&self, session_id: &str, messages: Vec<SessionMessage>) {
        self.inner.lock().unwrap().messages_by_session.insert(session_id.to_owned(), messages);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.inner.lock().unwrap().fail_create = fail;
    }

    pub fn set_fail_send_prompt(&self, fail: bool) {
        self.inner.lock().unwrap().fail_send_prompt = fail;
    }

    pub fn set_fail_list_messages(&self, fail: bool) {
        self.inner.lock().unwrap().fail_list_messages = fail;
    }

    pub fn forget_session(&self, session_id: &str) {
        self.inner.lock().unwrap().existing_sessions.remove(session_id);
    }

    /// Mark an arbitrary session id (e.g. a parent session the mock never
    /// created itself) as existing, for orphan-sweep tests.
    pub fn mark_session_exists(&self, session_id: &str) {
        self.inner.lock().unwrap().existing_sessions.insert(session_id.to_owned());
    }

    pub fn created_session_count(&self) -> usize {
        self.inner.lock().unwrap().created_sessions.len()
    }

    pub fn sent_prompt_count(&self) -> usize {
        self.inner.lock().unwrap().sent_prompts.len()
    }

    pub fn deleted_sessions(&self) -> Vec<String> {
        self.inner.lock().unwrap().deleted_sessions.clone()
    }

    pub fn list_messages_call_count(&self, session_id: &str) -> u64 {
        self.inner.lock().unwrap().list_messages_calls.get(session_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl HostClient for MockHostClient {
    async fn create_session(&self, request: CreateSessionRequest) -> Result<CreateSessionResponse, anyhow::Error> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_create {
            anyhow::bail!("mock: create_session configured to fail");
        }
        let id = inner.queued_session_ids.pop_front().unwrap_or_else(|| {
            let seq = self.next_session_seq.fetch_add(1, Ordering::SeqCst) + 1;
            format!("s{seq}")
        });
        inner.existing_sessions.insert(id.clone());
        inner.created_sessions.push(request);
        Ok(CreateSessionResponse { id })
    }

    async fn send_prompt(&self, request: PromptRequest) -> Result<(), anyhow::Error> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_send_prompt {
            anyhow::bail!("mock: send_prompt configured to fail");
        }
        inner.sent_prompts.push(request);
        Ok(())
    }

    async fn list_messages(&self, session_id: &str, _directory: Option<&str>) -> Result<Vec<SessionMessage>, anyhow::Error> {
        let mut inner = self.inner.lock().unwrap();
        *inner.list_messages_calls.entry(session_id.to_owned()).or_insert(0) += 1;
        if inner.fail_list_messages {
            anyhow::bail!("mock: list_messages configured to fail");
        }
        Ok(inner.messages_by_session.get(session_id).cloned().unwrap_or_default())
    }

    async fn delete_session(&self, session_id: &str, _directory: Option<&str>) -> Result<(), anyhow::Error> {
        let mut inner = self.inner.lock().unwrap();
        inner.existing_sessions.remove(session_id);
        inner.deleted_sessions.push(session_id.to_owned());
        Ok(())
    }

    async fn session_exists(&self, session_id: &str) -> bool {
        self.inner.lock().unwrap().existing_sessions.contains(session_id)
    }

    fn status_events(&self) -> Pin<Box<dyn Stream<Item = SessionStatusEvent> + Send>> {
        Box::pin(tokio_stream::empty())
    }
}

/// A [`NotificationSender`] that records every delivery attempt.
#[derive(Default)]
pub struct RecordingNotificationSender {
    sent: Mutex<Vec<(String, NotificationMessage)>>,
    fail: AtomicBool,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, NotificationMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send(&self, parent_session_id: &str, message: &NotificationMessage) -> Result<(), String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("mock: notification sender configured to fail".to_owned());
        }
        self.sent.lock().unwrap().push((parent_session_id.to_owned(), message.clone()));
        Ok(())
    }
}
