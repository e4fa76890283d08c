//! Offline CLI commands operating directly on the credential store.

use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use std::path::{Path, PathBuf};

use gcli_core::credentials::parse_credential;
use gcli_core::translate::list_models;
use gcli_types::{GatewayConfig, OwnerScope};

use crate::config::{save_config, CONFIG_FILE};
use crate::state::open_pool;

pub async fn import(
    config: &GatewayConfig,
    store_dir: PathBuf,
    file: &Path,
    name: Option<String>,
    user: Option<String>,
) -> Result<()> {
    let json = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let owner = user.map_or(OwnerScope::Global, OwnerScope::User);
    let name = name.or_else(|| file.file_name().map(|n| n.to_string_lossy().into_owned()));

    let record = parse_credential(&json, name.as_deref(), owner)?;
    let pool = open_pool(config, store_dir).await?;
    if pool.get(&record.id).is_some() {
        println!("{}", format!("Replacing existing credential {}", record.id).yellow());
    }
    let id = record.id.clone();
    let kind = record.kind();
    pool.add(record).await?;
    println!("{} {} ({})", "Imported".green(), id, kind);
    Ok(())
}

pub async fn list(config: &GatewayConfig, store_dir: PathBuf, json: bool) -> Result<()> {
    let pool = open_pool(config, store_dir).await?;
    let statuses = pool.snapshot_all();

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }
    if statuses.is_empty() {
        println!("{}", "No credentials found.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Id", "Kind", "Owner", "Status", "Failures", "Last used"]);
    for status in &statuses {
        let state = match status.status {
            "available" => Cell::new("available").fg(Color::Green),
            "cooling" => Cell::new(format!("cooling ({}s)", status.cooldown_remaining_seconds)).fg(Color::Yellow),
            other => Cell::new(other).fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(&status.id),
            Cell::new(status.kind.to_string()),
            Cell::new(status.owner.to_string()),
            state,
            Cell::new(status.consecutive_failure_count),
            Cell::new(
                status
                    .last_used
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    println!("{table}");
    println!("\n{} credentials total", statuses.len());
    Ok(())
}

pub fn models(config: &GatewayConfig) {
    for id in list_models(&config.upstream.base_models) {
        println!("{}", id);
    }
}

pub async fn init_config(data_dir: &Path, config: &GatewayConfig, force: bool) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    save_config(data_dir, config).await?;
    println!("{} {}", "Wrote".green(), path.display());
    Ok(())
}
