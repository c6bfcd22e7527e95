//! Configuration management
//!
//! This module handles parsing and validation of connection configuration
//! from TOML files. Every field has a default, so an empty file (or no file)
//! yields a working configuration.

mod validation;

pub use validation::{validate_display_name, validate_log_level, validate_thread_name};

use crate::error::{ConnectionError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What to do when a request arrives while another is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Queue behind pending requests, executed in submission order
    #[default]
    Queue,
    /// Reject with a busy error while any request is pending
    RejectWhenBusy,
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Display name reported by the connection
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Name of the worker thread
    #[serde(default = "default_worker_thread_name")]
    pub worker_thread_name: String,

    /// Behaviour for concurrent requests
    #[serde(default)]
    pub queue_policy: QueuePolicy,

    /// Wait for queued requests to drain when stopping
    #[serde(default)]
    pub join_on_stop: bool,

    /// Default log filter used by [`crate::logging::init_logging`]
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// On-disk layout: everything lives under a `[connection]` table
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    connection: Option<ConnectionConfig>,
}

impl ConnectionConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self {
            display_name: default_display_name(),
            worker_thread_name: default_worker_thread_name(),
            queue_policy: QueuePolicy::default(),
            join_on_stop: false,
            log_level: default_log_level(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ConnectionError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse(toml: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(toml)
            .map_err(|e| ConnectionError::Config(format!("Failed to parse TOML config: {}", e)))?;

        let config = file.connection.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_display_name(&self.display_name)?;
        validate_thread_name(&self.worker_thread_name)?;
        validate_log_level(&self.log_level)?;
        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// Default value functions for serde
fn default_display_name() -> String {
    "Build connection".to_string()
}

fn default_worker_thread_name() -> String {
    "build-connection-worker".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
