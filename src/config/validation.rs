//! Configuration validation functions

use crate::error::{ConnectionError, Result};

/// Levels accepted by the default log filter
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Validate the connection display name (non-empty, single line)
pub fn validate_display_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ConnectionError::Config(
            "Display name cannot be empty".to_string(),
        ));
    }

    if name.contains(|c: char| c == '\n' || c == '\r') {
        return Err(ConnectionError::Config(format!(
            "Display name '{}' must be a single line",
            name.escape_debug()
        )));
    }

    Ok(())
}

/// Validate the worker thread name (non-empty, no NUL bytes)
pub fn validate_thread_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ConnectionError::Config(
            "Worker thread name cannot be empty".to_string(),
        ));
    }

    // std::thread::Builder panics on interior NUL bytes
    if name.contains('\0') {
        return Err(ConnectionError::Config(
            "Worker thread name cannot contain NUL bytes".to_string(),
        ));
    }

    Ok(())
}

/// Validate the default log level
pub fn validate_log_level(level: &str) -> Result<()> {
    let normalized = level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&normalized.as_str()) {
        return Err(ConnectionError::Config(format!(
            "Invalid log level '{}' (expected one of: {})",
            level,
            LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
