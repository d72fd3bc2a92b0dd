// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use bgtask_core::config::ManagerConfig;
use bgtask_host::config::HostConfig;
use clap::Parser;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "bgtask-host", version, about)]
struct Cli {
    #[command(flatten)]
    host: HostConfig,
    #[command(flatten)]
    manager: ManagerConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let use_json = cli.manager.log_format == "json";
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.manager.log_level.clone()));
    if use_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Err(e) = bgtask_host::run(cli.host, cli.manager).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
