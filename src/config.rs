use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::events::DEFAULT_CHANNEL_CAPACITY;

/// Command-line flags. Only flags that were actually given override the
/// lower configuration layers.
#[derive(Parser, Serialize, Clone, Debug)]
#[command(name = "filecast-server", version, about = "File upload server with live SSE notifications")]
pub struct Cli {
    /// Path to TOML config file
    #[arg(long, default_value = "./filecast.toml")]
    #[serde(skip)]
    pub config: String,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// Port to listen on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Data directory for the SQLite database
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Directory uploaded files are written to
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_dir: Option<String>,

    /// Maximum accepted upload size in megabytes
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_upload_size_mb: Option<u32>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub data_dir: String,
    pub upload_dir: String,
    pub max_upload_size_mb: u32,
    /// Live event stream settings (loaded from [events] section in TOML)
    #[serde(default)]
    pub events: EventsConfig,
}

/// Configuration for the `/events` subscriber streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Frames buffered per subscriber before new events are dropped for it (default: 64)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Seconds between SSE keep-alive comments, 0 disables (default: 15)
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            keep_alive_secs: 15,
        }
    }
}

impl EventsConfig {
    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_keep_alive_secs() -> u64 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            data_dir: "./data".to_string(),
            upload_dir: "uploads".to_string(),
            max_upload_size_mb: 25,
            events: EventsConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (FILECAST_*) < CLI args
    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        Self::figment(cli).extract()
    }

    /// The layered provider stack behind [`Config::load`].
    /// Nested keys use a double underscore in env vars, e.g.
    /// `FILECAST_EVENTS__KEEP_ALIVE_SECS`.
    pub fn figment(cli: &Cli) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("FILECAST_").split("__"))
            .merge(Serialized::defaults(cli))
    }

    pub fn max_upload_bytes(&self) -> u64 {
        u64::from(self.max_upload_size_mb) * 1024 * 1024
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# filecast server configuration
# Place this file at ./filecast.toml or specify with --config <path>
# All settings can be overridden via environment variables (FILECAST_PORT,
# FILECAST_EVENTS__KEEP_ALIVE_SECS, etc.) or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database
# data_dir = "./data"

# Directory uploaded files are written to
# upload_dir = "uploads"

# Maximum accepted upload size in megabytes (default: 25)
# max_upload_size_mb = 25

# ---- Live upload events (GET /events) ----
# [events]

# Frames buffered per subscriber; when full, new events are dropped for that
# subscriber only (default: 64)
# channel_capacity = 64

# Seconds between SSE keep-alive comments, 0 disables (default: 15)
# keep_alive_secs = 15
"#
    .to_string()
}
