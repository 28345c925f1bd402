//! The probe-engine boundary.
//!
//! A [`Prober`] owns the actual measurement work for one job: it resolves
//! targets, probes them on an interval, keeps a rolling success window per
//! target, and emits raw results on a bounded channel. The orchestrator only
//! ever talks to the trait, so engines are swappable: [`TcpProber`] measures
//! TCP connect round-trip time, and tests script a [`mock::MockProber`].

pub mod mock;
pub mod tcp;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pingmux_core::{ResolvedTarget, SuccessCount, TargetId};

pub use tcp::{TcpProber, TcpProberFactory};

/// Capacity of the raw-result channel between an engine and its job's relay.
pub const RESULT_CHANNEL_CAPACITY: usize = 64;

/// Errors raised at the engine boundary.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The target line could not be parsed. The launcher drops the single
    /// target and keeps the rest of the request.
    #[error("invalid target {0:?}")]
    InvalidTarget(String),

    /// Name resolution produced no usable IPv4 address.
    #[error("could not resolve {target:?}: {source}")]
    Resolve {
        target: String,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("engine error: {0}")]
    Engine(String),
}

/// Engine-internal classification of one probe attempt. The job's result
/// relay translates this into the public wire kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EchoOutcome {
    /// A response arrived within the timeout.
    Reply,
    /// A response arrived, but only after the timeout had already fired.
    LateReply,
    /// An intermediate hop answered instead of the target.
    TtlExceeded,
    /// No response within the timeout.
    Timedout,
    /// The probe failed in a way the engine cannot attribute to the target.
    Unreachable,
}

/// One raw measurement as produced by an engine.
#[derive(Clone, Copy, Debug)]
pub struct RawResult {
    pub target_id: TargetId,
    pub outcome: EchoOutcome,
    pub sequence: u64,
    pub sent_at_nanos: u64,
    /// Zero when no response was observed.
    pub received_at_nanos: u64,
    /// Responding hop for `TtlExceeded`.
    pub peer: Option<Ipv4Addr>,
}

/// Effective per-job engine parameters, already clamped by the launcher.
#[derive(Clone, Copy, Debug)]
pub struct ProbeSettings {
    pub interval: Duration,
    pub timeout: Duration,
    /// Rolling success-window size, in probes.
    pub window: usize,
    /// Source address for outbound probes; unspecified = kernel's choice.
    pub source_addr: Ipv4Addr,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            timeout: Duration::from_millis(1000),
            window: 10,
            source_addr: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// One probe engine bound to one job.
///
/// Targets are added before `run`; the engine assigns `TargetId`s in
/// insertion order and keeps that order stable in `info` and
/// `success_counts`.
#[async_trait]
pub trait Prober: Send + Sync + std::fmt::Debug {
    /// Parse and resolve a target line, register it, and return its id.
    async fn add_target(&self, address: &str, comment: &str) -> Result<TargetId, ProbeError>;

    /// Accepted targets in stable order.
    fn info(&self) -> Vec<ResolvedTarget>;

    /// Point-in-time rolling success counters, in stable target order.
    fn success_counts(&self) -> Vec<SuccessCount>;

    /// Take the single-consumer raw-result stream. Returns `None` after the
    /// first call.
    fn take_results(&self) -> Option<mpsc::Receiver<RawResult>>;

    /// Probe until the scope is cancelled.
    async fn run(&self, scope: CancellationToken);
}

/// Builds a prober per job. This is the launcher's injection seam.
#[async_trait]
pub trait ProberFactory: Send + Sync {
    async fn build(&self, settings: ProbeSettings) -> Result<Arc<dyn Prober>, ProbeError>;
}
