//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or parsing the configuration file.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse the configuration JSON.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A configuration value was invalid (e.g., an unparseable address).
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
