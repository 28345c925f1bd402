//! Configuration types and compiled defaults.

use serde::{Deserialize, Serialize};

/// Inclusive clamp range for one start-request parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: u64,
    pub max: u64,
}

impl ValueRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Clamp `value` into `[min, max]`. Bounds are inclusive on both sides:
    /// `value <= min` yields `min`, `value >= max` yields `max`.
    pub fn clamp(&self, value: u64) -> u64 {
        if value <= self.min {
            self.min
        } else if value >= self.max {
            self.max
        } else {
            value
        }
    }
}

/// Per-parameter clamp table applied to every accepted start request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub lifetime_s: ValueRange,
    pub interval_ms: ValueRange,
    pub timeout_ms: ValueRange,
    pub stats_window: ValueRange,
    pub stats_interval_s: ValueRange,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            lifetime_s: ValueRange::new(0, 24 * 3600),
            interval_ms: ValueRange::new(200, 10 * 60 * 1000),
            timeout_ms: ValueRange::new(100, 60 * 1000),
            stats_window: ValueRange::new(1, 10_000),
            stats_interval_s: ValueRange::new(1, 3600),
        }
    }
}

/// TLS listener settings. When enabled, the server presents its certificate
/// and requires a client certificate verifiable against the configured CA.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    pub enabled: bool,
    pub ca_certificate: String,
    pub server_certificate: String,
    pub server_private_key: String,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ca_certificate: "ca.crt".into(),
            server_certificate: "server.crt".into(),
            server_private_key: "server.pem".into(),
        }
    }
}

/// Log destinations. An empty string means standard output/error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub access: String,
    pub error: String,
}

/// Top-level server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the RPC listener binds to.
    pub listen_addr: String,
    pub log: LogSettings,
    pub tls: TlsSettings,
    /// Source address for outbound probes ("0.0.0.0" = unspecified).
    pub probe_source_addr: String,
    /// Capacity of each stream subscriber queue and of each client's
    /// outbound frame queue.
    pub stream_buffer: usize,
    /// Capacity of the launcher's submission queue, the only admission
    /// control point. A full queue blocks submitters.
    pub submit_queue: usize,
    /// How long shutdown waits for running jobs before giving up.
    pub shutdown_grace_s: u64,
    pub limits: Limits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5555".into(),
            log: LogSettings::default(),
            tls: TlsSettings::default(),
            probe_source_addr: "0.0.0.0".into(),
            stream_buffer: 5,
            submit_queue: 10,
            shutdown_grace_s: 5,
            limits: Limits::default(),
        }
    }
}

impl Settings {
    /// Render the settings as pretty JSON (backs `--print-config`).
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_is_identity_inside_open_interval() {
        let range = ValueRange::new(200, 1000);
        for v in [201, 500, 999] {
            assert_eq!(range.clamp(v), v);
        }
    }

    #[test]
    fn clamp_saturates_at_bounds() {
        let range = ValueRange::new(200, 1000);
        assert_eq!(range.clamp(0), 200);
        assert_eq!(range.clamp(199), 200);
        assert_eq!(range.clamp(200), 200);
        assert_eq!(range.clamp(1000), 1000);
        assert_eq!(range.clamp(1001), 1000);
        assert_eq!(range.clamp(u64::MAX), 1000);
    }

    #[test]
    fn clamp_result_always_in_range() {
        let range = ValueRange::new(100, 60_000);
        for v in [0, 1, 99, 100, 101, 59_999, 60_000, 60_001, u64::MAX] {
            let clamped = range.clamp(v);
            assert!(clamped >= range.min && clamped <= range.max, "v={v}");
        }
    }

    #[test]
    fn default_limits_match_served_ranges() {
        let limits = Limits::default();
        assert_eq!(limits.interval_ms.min, 200);
        assert_eq!(limits.timeout_ms.min, 100);
        assert_eq!(limits.stats_window.max, 10_000);
        assert_eq!(limits.lifetime_s.max, 86_400);
        assert_eq!(limits.stats_interval_s, ValueRange::new(1, 3600));
    }

    #[test]
    fn default_settings_are_serving_ready() {
        let settings = Settings::default();
        assert_eq!(settings.listen_addr, "127.0.0.1:5555");
        assert!(!settings.tls.enabled);
        assert_eq!(settings.stream_buffer, 5);
        assert_eq!(settings.submit_queue, 10);
        assert!(settings.log.access.is_empty());
    }

    #[test]
    fn pretty_json_roundtrips() {
        let settings = Settings::default();
        let json = settings.to_pretty_json();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.listen_addr, settings.listen_addr);
        assert_eq!(parsed.limits.interval_ms, settings.limits.interval_ms);
    }
}
