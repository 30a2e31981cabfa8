/// Configuration parsing for the decoy HTTP server.
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ── Server config ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub server: ServerListenConfig,
    pub content: ContentConfig,
    /// Runtime option flags, e.g. `capture_commands`, `fix_get_client_ip`.
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerListenConfig {
    #[serde(default = "default_listen_addr")]
    pub listen: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct ContentConfig {
    /// Directory tree served to clients.
    pub root: PathBuf,
    /// Pinned `Server` banner. Absent: pick one at random. Empty: don't spoof.
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_timeout")]
    pub connection_timeout_sec: u64,
    #[serde(default = "default_max_request_head")]
    pub max_request_head: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connection_timeout_sec: default_timeout(),
            max_request_head: default_max_request_head(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// JSON-lines file receiving one observation record per request.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

// ── Defaults ─────────────────────────────────────────────────────────

fn default_listen_addr() -> String {
    "0.0.0.0".into()
}
fn default_max_connections() -> u32 {
    256
}
fn default_timeout() -> u64 {
    30
}
fn default_max_request_head() -> usize {
    16 * 1024
}
fn default_log_level() -> String {
    "info".into()
}

// ── Runtime options ──────────────────────────────────────────────────

/// Recognized runtime flags, parsed once from the `options` list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Attach every request header to the observation record.
    pub capture_headers: bool,
    /// Trust `X-Forwarded-For` / `X-Real-IP` for the client address.
    pub forwarded_client_ip: bool,
}

impl RuntimeOptions {
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut opts = Self::default();
        for name in names {
            match name.as_ref() {
                "capture_commands" => opts.capture_headers = true,
                "fix_get_client_ip" => opts.forwarded_client_ip = true,
                other => tracing::warn!("Ignoring unknown option {:?}", other),
            }
        }
        opts
    }
}

// ── Loaders ──────────────────────────────────────────────────────────

pub fn load_server_config(path: &Path) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    parse_server_config(&content)
}

pub fn parse_server_config(content: &str) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let config: ServerConfig = toml::from_str(content)?;
    if config.content.root.as_os_str().is_empty() {
        return Err("content.root must not be empty".into());
    }
    Ok(config)
}
