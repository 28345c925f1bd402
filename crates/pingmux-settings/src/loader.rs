//! Configuration file loading.
//!
//! The file is plain JSON deserialized over the compiled defaults: every
//! field carries `#[serde(default)]`, so a partial file only overrides what
//! it names.

use std::path::Path;

use tracing::debug;

use crate::errors::Result;
use crate::types::Settings;

/// Load settings from `path`. Fails if the file is unreadable or invalid;
/// the caller treats that as fatal before serving.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&raw)?;
    debug!(path = %path.display(), "config loaded");
    Ok(settings)
}
