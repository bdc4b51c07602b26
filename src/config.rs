//! Configuration module for the memframe server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::session::KeepaliveConfig;
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Engine wired behind the session core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// Ping/pong liveness engine.
    Ping,
    /// Frame echo engine.
    Echo,
}

/// Command-line arguments for the session server
#[derive(Parser, Debug)]
#[command(name = "memframe")]
#[command(author = "memframe authors")]
#[command(version = "0.1.0")]
#[command(about = "Per-connection session core for memcached-style text protocols", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:11211)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Keep-alive read timeout in milliseconds
    #[arg(short = 't', long)]
    pub timeout_ms: Option<u64>,

    /// Requests served per connection before it is closed
    #[arg(short = 'r', long)]
    pub max_requests: Option<usize>,

    /// Engine answering dispatched frames
    #[arg(short = 'e', long, value_enum)]
    pub engine: Option<EngineType>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub keepalive: KeepaliveSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Engine answering dispatched frames
    pub engine: Option<EngineType>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            engine: None,
        }
    }
}

/// Keep-alive policy configuration
#[derive(Debug, Deserialize)]
pub struct KeepaliveSection {
    /// Read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Requests served per connection before it is closed
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
}

impl Default for KeepaliveSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_requests: default_max_requests(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:11211".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_requests() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub timeout_ms: u64,
    pub max_requests: usize,
    pub engine: EngineType,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();
        Self::resolve(cli)
    }

    fn resolve(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            timeout_ms: cli.timeout_ms.unwrap_or(toml_config.keepalive.timeout_ms),
            max_requests: cli
                .max_requests
                .unwrap_or(toml_config.keepalive.max_requests),
            engine: cli
                .engine
                .or(toml_config.server.engine)
                .unwrap_or(EngineType::Ping),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// Keep-alive policy handed to each session.
    pub fn keepalive(&self) -> KeepaliveConfig {
        KeepaliveConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            max_requests: self.max_requests,
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
