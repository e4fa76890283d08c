//! Upstream endpoint and HTTP server configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Code Assist backend settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct UpstreamConfig {
    #[validate(url)]
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[validate(range(min = 10_u64, max = 3600_u64))]
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Optional outbound proxy (http:// or socks5://)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    /// Base models advertised by the model listing
    #[validate(length(min = 1_u64))]
    #[serde(default = "default_base_models")]
    pub base_models: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            proxy_url: None,
            base_models: default_base_models(),
        }
    }
}

/// Listener, API keys and on-disk locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[validate(range(min = 1_u16))]
    #[serde(default = "default_port")]
    pub port: u16,
    /// API key -> owning user id. `None` maps the key to the global scope.
    #[serde(default)]
    pub api_keys: HashMap<String, Option<String>>,
    /// Key required by the /admin endpoints; admin routes are closed when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Daily-rotated log files are written here when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_keys: HashMap::new(),
            admin_key: None,
            data_dir: None,
            log_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn get_socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn default_base_url() -> String {
    "https://cloudcode-pa.googleapis.com".to_string()
}

pub const fn default_request_timeout_secs() -> u64 {
    300
}

pub fn default_user_agent() -> String {
    format!("GeminiCLI/0.1.5 (gcli-gateway/{})", env!("CARGO_PKG_VERSION"))
}

pub fn default_base_models() -> Vec<String> {
    ["gemini-2.5-pro", "gemini-2.5-flash", "gemini-3-pro-preview"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

pub fn default_host() -> String {
    "127.0.0.1".to_string()
}

pub const fn default_port() -> u16 {
    7861
}

pub fn default_log_level() -> String {
    "info".to_string()
}
