// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the thin tool-surface binary: where it binds its own
/// HTTP server, and how it reaches the coding-assistant host it proxies
/// `launch`/`retrieve`/`cancel` calls into.
#[derive(Debug, Clone, clap::Args)]
pub struct HostConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "BGTASK_HOST_BIND_HOST")]
    pub bind_host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9810, env = "BGTASK_HOST_BIND_PORT")]
    pub bind_port: u16,

    /// Base URL of the coding-assistant host's session RPC surface.
    #[arg(long, env = "BGTASK_HOST_UPSTREAM_URL", default_value = "http://127.0.0.1:4096")]
    pub upstream_url: String,

    /// Bearer token for the upstream host RPC surface. If unset, requests
    /// are sent unauthenticated.
    #[arg(long, env = "BGTASK_HOST_UPSTREAM_TOKEN")]
    pub upstream_token: Option<String>,

    /// Bearer token this binary requires on inbound tool-surface requests.
    /// If unset, inbound auth is disabled.
    #[arg(long, env = "BGTASK_HOST_AUTH_TOKEN")]
    pub auth_token: Option<String>,
}

impl HostConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}
