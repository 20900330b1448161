//! Configuration management for the host folder SFTP server.
//!
//! This module provides TOML-based configuration file loading.
//! The default configuration path is `~/.config/hostfolder-sftpd/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::FailurePolicy;

/// Port the server listens on when neither the configuration nor the
/// command line says otherwise.
pub const DEFAULT_PORT: u16 = 2022;

/// MAC algorithms the transport can be restricted to.
pub const SUPPORTED_MACS: &[&str] = &[
    "hmac-sha1",
    "hmac-sha2-256",
    "hmac-sha2-512",
    "hmac-sha1-etm@openssh.com",
    "hmac-sha2-256-etm@openssh.com",
    "hmac-sha2-512-etm@openssh.com",
];

/// Environment variable overriding the configured port.
pub const PORT_ENV: &str = "HOSTFOLDER_SFTP_PORT";

/// Environment variable overriding the log level.
pub const LOG_LEVEL_ENV: &str = "HOSTFOLDER_LOG_LEVEL";

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{PORT_ENV} must be a port number, got {0:?}")]
    InvalidPortOverride(String),

    #[error("macs must list at least one algorithm")]
    NoMacs,

    #[error("unsupported MAC algorithm: {0}")]
    UnsupportedMac(String),

    #[error("files.root must be an absolute path, got {0}")]
    RelativeRoot(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Listener and transport configuration.
    pub server: ServerConfig,

    /// Host folder configuration.
    pub files: FilesConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Listener and transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on. When set to a non-zero value, takes precedence
    /// over `--port`; zero means unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Address to bind.
    pub bind_address: String,

    /// MAC algorithms offered to clients, in preference order.
    pub macs: Vec<String>,

    /// How far handshake and transfer failures reach.
    pub failure_policy: FailurePolicy,
}

/// Host folder configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesConfig {
    /// Directory served as the SFTP root.
    pub root: PathBuf,

    /// Refuse every operation that modifies the host folder.
    pub read_only: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: None,
            bind_address: "0.0.0.0".to_string(),
            // The sshfs clients this server is built for negotiate hmac-sha1.
            macs: vec!["hmac-sha1".to_string()],
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            read_only: false,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hostfolder-sftpd")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - HOSTFOLDER_SFTP_PORT: Override the listening port
    /// - HOSTFOLDER_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    ///
    /// Returns the names of the variables that were applied, so they can be
    /// logged once logging is set up.
    pub fn apply_env_overrides(&mut self) -> Result<Vec<&'static str>, ConfigError> {
        let mut applied = Vec::new();

        if let Ok(port) = std::env::var(PORT_ENV) {
            if !port.is_empty() {
                let parsed = port
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidPortOverride(port.clone()))?;
                self.server.port = Some(parsed);
                applied.push(PORT_ENV);
            }
        }

        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.is_empty() {
                self.daemon.log_level = level;
                applied.push(LOG_LEVEL_ENV);
            }
        }

        Ok(applied)
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.macs.is_empty() {
            return Err(ConfigError::NoMacs);
        }
        if let Some(mac) = self
            .server
            .macs
            .iter()
            .find(|mac| !SUPPORTED_MACS.contains(&mac.as_str()))
        {
            return Err(ConfigError::UnsupportedMac(mac.clone()));
        }

        if !self.files.root.is_absolute() {
            return Err(ConfigError::RelativeRoot(
                self.files.root.display().to_string(),
            ));
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Returns the port to listen on.
    ///
    /// A configured non-zero port wins over the command-line value.
    pub fn effective_port(&self, cli_port: u16) -> u16 {
        self.server
            .port
            .filter(|port| *port != 0)
            .unwrap_or(cli_port)
    }

    /// Returns the `host:port` address to bind.
    pub fn listen_address(&self, cli_port: u16) -> String {
        format!("{}:{}", self.server.bind_address, self.effective_port(cli_port))
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
