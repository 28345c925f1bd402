use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging subsystem.
#[derive(Clone, Debug, Default)]
pub struct TelemetryConfig {
    /// Destination for info-and-below events. Empty = stdout.
    pub access_path: String,
    /// Destination for warn-and-above events. Empty = stderr.
    pub error_path: String,
    /// Raise the default filter from `info` to `debug`.
    pub debug: bool,
}

/// Errors raised while wiring up the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to open log file {path}: {source}")]
    OpenLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to initialize tracing subscriber: {0}")]
    Init(String),
}

/// Keeps the non-blocking file writers alive. Drop flushes them.
pub struct TelemetryGuard {
    _access: Option<WorkerGuard>,
    _error: Option<WorkerGuard>,
}

fn file_writer(path: &str) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), TelemetryError> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| TelemetryError::OpenLogFile {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(tracing_appender::non_blocking(file))
}

/// Initialize the tracing subscriber. Call once at startup and hold the
/// returned guard until exit.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let default_level = if config.debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Access stream: info and quieter, routed to stdout or the access file.
    let access_filter =
        tracing_subscriber::filter::filter_fn(|meta| *meta.level() >= Level::INFO);
    let (access_layer, access_guard) = if config.access_path.is_empty() {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(access_filter)
            .boxed();
        (layer, None)
    } else {
        let (writer, guard) = file_writer(&config.access_path)?;
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_filter(access_filter)
            .boxed();
        (layer, Some(guard))
    };

    // Error stream: warn and louder, routed to stderr or the error file.
    let error_filter =
        tracing_subscriber::filter::filter_fn(|meta| *meta.level() <= Level::WARN);
    let (error_layer, error_guard) = if config.error_path.is_empty() {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(error_filter)
            .boxed();
        (layer, None)
    } else {
        let (writer, guard) = file_writer(&config.error_path)?;
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_filter(error_filter)
            .boxed();
        (layer, Some(guard))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(access_layer)
        .with(error_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    Ok(TelemetryGuard {
        _access: access_guard,
        _error: error_guard,
    })
}
