//! Tracing initialization for the pingmux binaries.
//!
//! Two destinations, mirroring the server's config: the access log (request
//! and job lifecycle events, `info` and below) and the error log (`warn+`).
//! An empty destination means standard output; a path gets a non-blocking
//! file writer whose guard must be held for the process lifetime.

mod logging;

pub use logging::{init_telemetry, TelemetryConfig, TelemetryError, TelemetryGuard};
