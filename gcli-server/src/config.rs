//! `config.json` loading, environment overrides and saving.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use gcli_core::storage::atomic_write;
use gcli_types::{ConfigError, GatewayConfig};

pub const CONFIG_FILE: &str = "config.json";
const DATA_DIR_NAME: &str = "gcli-gateway";

/// CLI/env value, else the platform data directory, else `./data`.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| dirs::data_dir().map(|d| d.join(DATA_DIR_NAME)))
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Read `config.json` from `data_dir`; a missing file yields defaults.
pub async fn load_config(data_dir: &Path) -> Result<GatewayConfig, ConfigError> {
    let path = data_dir.join(CONFIG_FILE);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let config = serde_json::from_slice(&bytes).map_err(|e| ConfigError::from_json_error(&e))?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No {} in {}, using defaults", CONFIG_FILE, data_dir.display());
            Ok(GatewayConfig::default())
        },
        Err(e) => Err(ConfigError::from_io_error(&e)),
    }
}

pub async fn save_config(data_dir: &Path, config: &GatewayConfig) -> Result<(), ConfigError> {
    let json = serde_json::to_vec_pretty(config).map_err(|e| ConfigError::from_json_error(&e))?;
    atomic_write(&data_dir.join(CONFIG_FILE), &json)
        .await
        .map_err(|e| ConfigError::WriteError { message: e.to_string() })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError { field: field.to_string(), message: message.into() }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `GCLI_*` overrides read through `lookup`, then validate.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("GCLI_PORT") {
        config.server.port = port.trim().parse().map_err(|_| invalid("GCLI_PORT", format!("not a port: {}", port)))?;
    }
    if let Some(host) = lookup("GCLI_HOST") {
        config.server.host = host;
    }
    if let Some(dir) = lookup("GCLI_DATA_DIR") {
        config.server.data_dir = Some(dir);
    }
    if let Some(key) = lookup("GCLI_API_KEY").filter(|k| !k.is_empty()) {
        config.server.api_keys.insert(key, None);
    }
    if let Some(key) = lookup("GCLI_ADMIN_KEY").filter(|k| !k.is_empty()) {
        config.server.admin_key = Some(key);
    }
    if let Some(raw) = lookup("GCLI_UPSTREAM_URL") {
        let parsed = url::Url::parse(&raw).map_err(|e| invalid("GCLI_UPSTREAM_URL", e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("GCLI_UPSTREAM_URL", format!("unsupported scheme {}", parsed.scheme())));
        }
        config.upstream.base_url = raw.trim_end_matches('/').to_string();
    }
    if let Some(raw) = lookup("GCLI_ISOLATION") {
        match parse_bool(&raw) {
            Some(enabled) => config.pool.isolation_enabled = enabled,
            None => warn!("Ignoring GCLI_ISOLATION={}: expected true/false", raw),
        }
    }
    config.check()
}

/// Load, override from the process environment and validate.
pub async fn load_effective_config(data_dir: &Path) -> Result<GatewayConfig, ConfigError> {
    let mut config = load_config(data_dir).await?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}
