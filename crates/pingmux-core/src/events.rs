use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::ids::TargetId;

/// Public classification of one probe attempt.
///
/// Engine-internal outcomes are translated into this set by the job's result
/// relay; anything the relay does not recognize maps to `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Receive,
    ReceiveAfterTimeout,
    TtlExceeded,
    Timeout,
    Unknown,
}

/// One probe attempt against one target, as streamed to subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target_id: TargetId,
    pub kind: ResultKind,
    pub sequence: u64,
    pub sent_at_nanos: u64,
    /// Zero when no response was observed.
    pub received_at_nanos: u64,
    /// Responding peer; meaningful only for `TtlExceeded`.
    pub peer: Option<Ipv4Addr>,
}

impl ProbeResult {
    pub fn is_success(&self) -> bool {
        matches!(self.kind, ResultKind::Receive)
    }
}

/// Rolling success count for one target: successes among the last N probes,
/// N being the job's clamped statistics window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessCount {
    pub target_id: TargetId,
    pub count: u64,
}

/// Point-in-time counters for every target of a job, in the engine's stable
/// target order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub targets: Vec<SuccessCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_kind_serde_tags() {
        let json = serde_json::to_string(&ResultKind::ReceiveAfterTimeout).unwrap();
        assert_eq!(json, "\"receive_after_timeout\"");
        let parsed: ResultKind = serde_json::from_str("\"ttl_exceeded\"").unwrap();
        assert_eq!(parsed, ResultKind::TtlExceeded);
    }

    #[test]
    fn success_classification() {
        let mut result = ProbeResult {
            target_id: TargetId::new(0),
            kind: ResultKind::Receive,
            sequence: 1,
            sent_at_nanos: 10,
            received_at_nanos: 20,
            peer: None,
        };
        assert!(result.is_success());

        result.kind = ResultKind::Timeout;
        assert!(!result.is_success());
        result.kind = ResultKind::ReceiveAfterTimeout;
        assert!(!result.is_success());
    }

    #[test]
    fn probe_result_roundtrip() {
        let result = ProbeResult {
            target_id: TargetId::new(3),
            kind: ResultKind::TtlExceeded,
            sequence: 42,
            sent_at_nanos: 1_000,
            received_at_nanos: 2_000,
            peer: Some(Ipv4Addr::new(192, 0, 2, 1)),
        };
        let json = serde_json::to_string(&result).unwrap();
        let parsed: ProbeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, ResultKind::TtlExceeded);
        assert_eq!(parsed.peer, Some(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(parsed.sequence, 42);
    }
}
