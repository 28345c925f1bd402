//! # pingmux-settings
//!
//! Server configuration: listen address, TLS material, log destinations,
//! probe source address, queue capacities, and the per-parameter clamp
//! limits applied to every start request.
//!
//! Settings are loaded from a JSON file at startup; any field missing from
//! the file keeps its compiled default. A missing or unparseable file is a
//! fatal startup error; the caller decides, the loader just reports.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::load_settings;
pub use types::{Limits, LogSettings, Settings, TlsSettings, ValueRange};
