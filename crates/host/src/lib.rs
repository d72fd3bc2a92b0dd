// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The thin tool-surface binary: translates HTTP requests from the
//! coding-assistant host into calls on [`bgtask_core::manager::TaskManager`]
//! and formats the responses. No core logic lives here.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod notification;
pub mod router;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use bgtask_core::config::ManagerConfig;
use bgtask_core::manager::TaskManager;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::client::HttpHostClient;
use crate::config::HostConfig;
use crate::notification::HttpNotificationSender;
use crate::router::build_router;
use crate::state::AppState;

/// Assemble the manager and its collaborators, serve the tool-surface HTTP
/// API, and drain/persist on shutdown.
/// Install the `ring` crypto provider for `rustls` if one isn't already
/// registered. `reqwest` is built without a default TLS backend, so this
/// must run before any HTTPS request to the upstream host.
fn ensure_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

pub async fn run(host_config: HostConfig, manager_config: ManagerConfig) -> anyhow::Result<()> {
    ensure_crypto_provider();
    manager_config.validate()?;
    let addr = host_config.bind_addr();
    let shutdown = CancellationToken::new();

    let host_client = Arc::new(HttpHostClient::new(host_config.upstream_url.clone(), host_config.upstream_token.clone())?);
    let notification_sender =
        Arc::new(HttpNotificationSender::new(Arc::clone(&host_client) as Arc<dyn bgtask_core::host::HostClient>));

    let manager = TaskManager::new(
        Arc::new(manager_config),
        Arc::clone(&host_client) as Arc<dyn bgtask_core::host::HostClient>,
        notification_sender as Arc<dyn bgtask_core::notification::NotificationSender>,
    );

    if let Err(err) = manager.load_state().await {
        error!(err = %err, "failed to load persisted task state, starting empty");
    }
    manager.spawn_orphan_sweep();

    let state = Arc::new(AppState::new(Arc::clone(&manager), host_client, host_config, shutdown.clone()));
    let router = build_router(state);

    info!(addr = %addr, "background task manager listening");
    let listener = TcpListener::bind(&addr).await?;

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        ctrl_c_shutdown.cancel();
    });

    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    if let Err(err) = manager.drain(Duration::from_secs(30)).await {
        error!(err = %err, "drain timed out during shutdown");
    }
    if let Err(err) = manager.save_state().await {
        error!(err = %err, "failed to persist task state on shutdown");
    }

    Ok(())
}
