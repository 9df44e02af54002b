//! Configuration file support for copilot-sdk.
//!
//! Configuration is loaded from `~/.config/copilot-sdk/config.toml` with the following precedence:
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`COPILOT_CLI_PATH`, `COPILOT_CLI_URL`, `COPILOT_MODEL`)
//! 3. Configuration file
//! 4. Default values (lowest priority)
//!
//! # Example Configuration
//!
//! ```toml
//! # ~/.config/copilot-sdk/config.toml
//! model = "gpt-4.1"
//! log_level = "debug"
//! system_message = "Answer in one paragraph."
//!
//! [mcp_servers.filesystem]
//! type = "local"
//! command = "npx"
//! args = ["-y", "@modelcontextprotocol/server-filesystem", "/path/to/dir"]
//!
//! [mcp_servers.github]
//! type = "http"
//! url = "https://api.githubcopilot.com/mcp/"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::client::{ClientOptions, LogLevel};
use crate::protocol::{McpServerConfig, SystemMessage};
use crate::session::SessionConfig;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Agent executable
    pub cli_path: Option<PathBuf>,

    /// Already running agent to connect to instead of spawning one
    pub cli_url: Option<String>,

    pub log_level: Option<LogLevel>,

    /// Default model for new sessions
    pub model: Option<String>,

    /// Stream deltas (default on)
    pub streaming: Option<bool>,

    /// Appended to the agent's system message
    pub system_message: Option<String>,

    /// Where the SDK log file goes
    pub log_dir: Option<PathBuf>,

    /// MCP servers made available to every session
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// Returns default configuration if file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("copilot-sdk")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Apply `COPILOT_CLI_URL` and `COPILOT_MODEL`.
    ///
    /// `COPILOT_CLI_PATH` is left to [`ClientOptions::resolved_cli_path`] so it
    /// stays a default and never conflicts with a `cli_url`.
    pub fn with_env(self) -> Self {
        self.with_env_from(|name| std::env::var(name).ok())
    }

    fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let set = |name: &str| lookup(name).filter(|value| !value.is_empty());
        if let Some(url) = set("COPILOT_CLI_URL") {
            self.cli_url = Some(url);
        }
        if let Some(model) = set("COPILOT_MODEL") {
            self.model = Some(model);
        }
        self
    }

    /// Merge with CLI overrides.
    ///
    /// CLI arguments take precedence over environment and file values.
    pub fn with_overrides(
        mut self,
        cli_path: Option<PathBuf>,
        cli_url: Option<String>,
        model: Option<String>,
    ) -> Self {
        if cli_path.is_some() {
            self.cli_path = cli_path;
        }
        if cli_url.is_some() {
            self.cli_url = cli_url;
        }
        if model.is_some() {
            self.model = model;
        }
        self
    }

    /// Log directory, falling back to `~/.copilot-sdk/logs`
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(crate::log::default_dir)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            cli_path: self.cli_path.clone(),
            cli_url: self.cli_url.clone(),
            log_level: self.log_level.unwrap_or_default(),
            ..Default::default()
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new().with_streaming(self.streaming.unwrap_or(true));
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        if let Some(message) = &self.system_message {
            config = config.with_system_message(SystemMessage::append(message.clone()));
        }
        for (name, server) in &self.mcp_servers {
            config = config.with_mcp_server(name.clone(), server.clone());
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.cli_path.is_none());
        assert!(config.model.is_none());
        assert!(config.mcp_servers.is_empty());
        assert!(config.session_config().streaming);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            model = "gpt-4.1"
            log_level = "debug"
            streaming = false
            system_message = "Be brief."

            [mcp_servers.fs]
            type = "stdio"
            command = "npx"
            args = ["-y", "server-filesystem"]

            [mcp_servers.github]
            type = "http"
            url = "https://api.githubcopilot.com/mcp/"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.model.as_deref(), Some("gpt-4.1"));
        assert_eq!(config.log_level, Some(LogLevel::Debug));
        assert_eq!(
            config.mcp_servers["fs"],
            McpServerConfig::local("npx", ["-y", "server-filesystem"])
        );

        let session = config.session_config();
        assert!(!session.streaming);
        assert_eq!(session.model.as_deref(), Some("gpt-4.1"));
        assert_eq!(session.system_message, Some(SystemMessage::append("Be brief.")));
        assert_eq!(session.mcp_servers.len(), 2);
        assert_eq!(config.client_options().log_level, LogLevel::Debug);
    }

    #[test]
    fn test_precedence() {
        let file: Config = toml::from_str(r#"model = "from-file""#).unwrap();

        let env = file.clone().with_env_from(|name| match name {
            "COPILOT_MODEL" => Some("from-env".to_string()),
            "COPILOT_CLI_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(env.model.as_deref(), Some("from-env"));
        assert!(env.cli_url.is_none());

        let cli = env.with_overrides(None, Some("8080".into()), Some("from-cli".into()));
        assert_eq!(cli.model.as_deref(), Some("from-cli"));
        assert_eq!(cli.client_options().cli_url.as_deref(), Some("8080"));
    }

    #[test]
    fn test_cli_path_env_does_not_block_cli_url() {
        let config = Config::default()
            .with_env_from(|name| match name {
                "COPILOT_CLI_PATH" => Some("/usr/local/bin/copilot".to_string()),
                _ => None,
            })
            .with_overrides(None, Some("8080".into()), None);

        let options = config.client_options();
        assert!(options.cli_path.is_none());
        assert_eq!(
            options.connection_mode().unwrap(),
            crate::client::ConnectionMode::External { host: "127.0.0.1".into(), port: 8080 }
        );
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/copilot-sdk/config.toml"));
        assert!(config.model.is_none());
    }
}
