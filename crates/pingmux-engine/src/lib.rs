//! # pingmux-engine
//!
//! The orchestrator core: admission control, the two-phase job registry,
//! running job instances, and non-blocking fan-out of their event streams.
//!
//! The flow is `JobLauncher::submit` → dispatch loop → `JobInstance::run`,
//! with the `JobRegistry` making ids observable from the moment they are
//! reserved and `BroadcastSet` carrying results and statistics to however
//! many stream subscribers are attached.

pub mod broadcast;
pub mod job;
pub mod launcher;
pub mod registry;

pub use broadcast::BroadcastSet;
pub use job::{JobInstance, JobStatus};
pub use launcher::{JobLauncher, LauncherConfig};
pub use registry::{JobEntry, JobRegistry};
