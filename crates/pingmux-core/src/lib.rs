//! Shared domain types for the pingmux probe orchestrator.
//!
//! Everything that crosses a crate boundary lives here: job and target
//! identifiers, probe result events, statistics snapshots, and the
//! start-request/job-info shapes exchanged with RPC clients.

pub mod events;
pub mod ids;
pub mod request;

pub use events::{ProbeResult, ResultKind, StatisticsSnapshot, SuccessCount};
pub use ids::{JobId, TargetId};
pub use request::{EffectiveParams, JobInfo, JobSummary, ResolvedTarget, StartRequest, TargetSpec};

/// Current wall-clock time as unix nanoseconds, the timestamp unit used on
/// the wire.
pub fn now_nanos() -> u64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64
}
