// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use bgtask_core::manager::TaskManager;
use tokio_util::sync::CancellationToken;

use crate::client::HttpHostClient;
use crate::config::HostConfig;

/// Shared state for the tool-surface HTTP service: the task manager plus
/// enough of the transport layer to route inbound webhook events back into
/// it.
pub struct AppState {
    pub manager: Arc<TaskManager>,
    pub host_client: Arc<HttpHostClient>,
    pub config: HostConfig,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(manager: Arc<TaskManager>, host_client: Arc<HttpHostClient>, config: HostConfig, shutdown: CancellationToken) -> Self {
        Self { manager, host_client, config, shutdown }
    }
}
