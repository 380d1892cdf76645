// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;

mod auth;
mod cli;
mod config;
mod error;
mod logging;
mod rate_limit;
mod server;
mod state;
mod telemetry;
mod websocket;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    if cli.print_config {
        println!("{}", config::Config::default_toml());
        return Ok(());
    }

    let mut config = config::Config::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    let _log_guard = logging::init_logging(&config.log)
        .map_err(|e| anyhow::anyhow!("logging setup failed: {e}"))?;
    let metrics_provider = telemetry::init_metrics();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting glinkd");
    let state = state::AppState::from_config(config).await?;
    let result = server::run(state).await;

    if let Err(e) = metrics_provider.shutdown() {
        tracing::warn!(error = %e, "metrics provider shutdown failed");
    }
    result
}
