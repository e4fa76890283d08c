//! gcli gateway server
//!
//! Serves OpenAI-compatible `/v1/*` and Gemini-native `/v1beta/*` endpoints
//! over a pool of Google credentials, plus `/admin/*` for pool management.
//! Credential import and listing also work offline through subcommands.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

mod auth;
mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod routes;
mod state;

#[cfg(test)]
mod test_helpers;

use cli::{Cli, Commands};
use gcli_types::GatewayConfig;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = config::resolve_data_dir(cli.data_dir);
    let config = config::load_effective_config(&data_dir)
        .await
        .with_context(|| format!("Failed to load configuration from {}", data_dir.display()))?;
    let store_dir = config
        .server
        .data_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.clone());

    match cli.command {
        None => serve(config, store_dir, None).await,
        Some(Commands::Serve { port }) => serve(config, store_dir, port).await,
        Some(Commands::Import { file, name, user }) => {
            let _guard = logging::init_logging("warn", None)?;
            commands::import(&config, store_dir, &file, name, user).await
        },
        Some(Commands::List { json }) => {
            let _guard = logging::init_logging("warn", None)?;
            commands::list(&config, store_dir, json).await
        },
        Some(Commands::Models) => {
            commands::models(&config);
            Ok(())
        },
        Some(Commands::InitConfig { force }) => commands::init_config(&data_dir, &config, force).await,
    }
}

async fn serve(mut config: GatewayConfig, store_dir: PathBuf, port: Option<u16>) -> Result<()> {
    let _guard = logging::init_logging(&config.server.log_level, config.server.log_dir.as_deref())?;
    if let Some(port) = port {
        config.server.port = port;
    }

    info!("gcli gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Credential store: {}", store_dir.display());

    let state = AppState::build(&config, store_dir).await?;
    match gcli_core::credentials::autoload_env(state.pool()).await {
        Ok(0) => {},
        Ok(count) => info!("Imported {} credentials from environment", count),
        Err(e) => warn!("Environment credential import failed: {}", e),
    }
    info!("{} credentials loaded", state.pool().len());
    if state.api_keys().is_open() {
        warn!("No API keys configured: every request runs against the global pool without authentication");
    }
    if state.admin_key().is_none() {
        info!("No admin key configured: /admin is disabled");
    }

    let app = routes::build_router(state);
    let addr = config.server.get_socket_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", addr);
    info!("OpenAI endpoints at http://{}/v1/", addr);
    info!("Gemini endpoints at http://{}/v1beta/", addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
