//! Client options and connection-mode resolution

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CopilotError, Result};

/// Agent log verbosity passed as `--log-level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    None,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    All,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::None => "none",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::All => "all",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Agent executable; falls back to `COPILOT_CLI_PATH`, then `copilot`
    pub cli_path: Option<PathBuf>,
    /// Extra arguments placed before the SDK's own
    pub cli_args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Talk over the child's stdio; `None` means yes unless `cli_url` is set
    pub use_stdio: Option<bool>,
    /// Port for TCP mode; 0 lets the agent choose
    pub port: u16,
    /// Address of an already running agent; nothing is spawned
    pub cli_url: Option<String>,
    pub log_level: LogLevel,
    /// Start on first use instead of requiring `start()`
    pub auto_start: bool,
    /// Reconnect on next use after the connection drops
    pub auto_restart: bool,
    /// Bound on spawn + handshake
    pub startup_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            cli_path: None,
            cli_args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            use_stdio: None,
            port: 0,
            cli_url: None,
            log_level: LogLevel::default(),
            auto_start: true,
            auto_restart: true,
            startup_timeout: Duration::from_secs(10),
        }
    }
}

/// How the client reaches the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectionMode {
    Stdio,
    SpawnTcp { port: u16 },
    External { host: String, port: u16 },
}

impl ClientOptions {
    pub fn resolved_cli_path(&self) -> PathBuf {
        self.cli_path
            .clone()
            .or_else(|| std::env::var("COPILOT_CLI_PATH").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("copilot"))
    }

    pub(crate) fn connection_mode(&self) -> Result<ConnectionMode> {
        let Some(url) = self.cli_url.as_deref() else {
            return Ok(if self.use_stdio.unwrap_or(true) {
                ConnectionMode::Stdio
            } else {
                ConnectionMode::SpawnTcp { port: self.port }
            });
        };

        if self.cli_path.is_some() {
            return Err(CopilotError::Configuration(
                "cli_url cannot be combined with cli_path".into(),
            ));
        }
        if self.use_stdio == Some(true) {
            return Err(CopilotError::Configuration(
                "cli_url cannot be combined with use_stdio".into(),
            ));
        }

        let (host, port) = parse_cli_url(url)?;
        Ok(ConnectionMode::External { host, port })
    }
}

/// Accepts `8080`, `host:8080` and `http://host:8080`
pub(crate) fn parse_cli_url(url: &str) -> Result<(String, u16)> {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    let (host, port) = match without_scheme.rsplit_once(':') {
        Some((host, port)) => (host, port),
        None if without_scheme.chars().all(|c| c.is_ascii_digit()) => ("", without_scheme),
        None => {
            return Err(CopilotError::Configuration(format!(
                "cli_url '{}' has no port",
                url
            )));
        }
    };

    let port = match port.parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => {
            return Err(CopilotError::Configuration(format!(
                "cli_url '{}' has an invalid port",
                url
            )));
        }
    };

    let host = if host.is_empty() { "127.0.0.1" } else { host };
    Ok((host.to_string(), port))
}
