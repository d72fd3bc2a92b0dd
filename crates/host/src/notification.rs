// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Delivers completion notifications into the parent session as a
//! user-visible prompt, over the same host client the manager uses to talk
//! to child sessions.

use std::sync::Arc;

use async_trait::async_trait;
use bgtask_core::host::{HostClient, PromptBody, PromptPart, PromptRequest, PromptTools};
use bgtask_core::notification::{NotificationMessage, NotificationSender};

pub struct HttpNotificationSender {
    host: Arc<dyn HostClient>,
}

impl HttpNotificationSender {
    pub fn new(host: Arc<dyn HostClient>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send(&self, parent_session_id: &str, message: &NotificationMessage) -> Result<(), String> {
        let text = serde_json::to_string(message).map_err(|e| e.to_string())?;
        let request = PromptRequest {
            session_id: parent_session_id.to_owned(),
            body: PromptBody {
                agent: "orchestrator".to_owned(),
                tools: PromptTools { background_task: false, task: false },
                parts: vec![PromptPart { kind: "text".to_owned(), text }],
                system: Vec::new(),
                variant: None,
                model: None,
            },
            directory: None,
        };
        self.host.send_prompt(request).await.map_err(|e| e.to_string())
    }
}
