use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::ids::{JobId, TargetId};

/// One requested probe target, as submitted by a client.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TargetSpec {
    /// `host`, `host:port`, dotted IPv4 or `IPv4:port`.
    pub address: String,
    #[serde(default)]
    pub comment: String,
}

/// A request to start one probe job. All numeric parameters are clamped
/// server-side into their configured limits before use.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
    #[serde(default)]
    pub interval_ms: u64,
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub lifetime_s: u64,
    #[serde(default)]
    pub stats_window: u64,
    #[serde(default)]
    pub stats_interval_s: u64,
}

/// The effective (post-clamp) parameters a job actually runs with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveParams {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub lifetime_s: u64,
    pub stats_window: u64,
    pub stats_interval_s: u64,
}

/// A target as accepted by the probe engine: id assigned, address resolved.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub id: TargetId,
    pub requested: String,
    pub resolved: Ipv4Addr,
    pub comment: String,
}

/// List-entry shape for `job.list`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub description: String,
    pub started_at_nanos: u64,
    pub expires_at_nanos: u64,
}

/// Full job description for `job.info`. An unknown id yields the default
/// (empty) record rather than an error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobInfo {
    pub description: String,
    pub targets: Vec<ResolvedTarget>,
    pub params: EffectiveParams,
    pub started_at_nanos: u64,
    pub expires_at_nanos: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_defaults_missing_fields() {
        let req: StartRequest = serde_json::from_str(
            r#"{"description":"edge probes","targets":[{"address":"192.0.2.7"}]}"#,
        )
        .unwrap();
        assert_eq!(req.description, "edge probes");
        assert_eq!(req.targets.len(), 1);
        assert_eq!(req.targets[0].comment, "");
        assert_eq!(req.interval_ms, 0);
        assert_eq!(req.lifetime_s, 0);
    }

    #[test]
    fn job_info_default_is_empty() {
        let info = JobInfo::default();
        assert!(info.description.is_empty());
        assert!(info.targets.is_empty());
        assert_eq!(info.started_at_nanos, 0);
    }

    #[test]
    fn job_summary_roundtrip() {
        let summary = JobSummary {
            id: JobId::new(99),
            description: "core routers".into(),
            started_at_nanos: 1,
            expires_at_nanos: 2,
        };
        let json = serde_json::to_string(&summary).unwrap();
        let parsed: JobSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, JobId::new(99));
        assert_eq!(parsed.description, "core routers");
    }
}
