//! TCP connect-time probe engine.
//!
//! Each target is probed by opening a TCP connection and timing the
//! handshake. A completed connect counts as a reply, and so does an
//! immediate refusal, since the host answered either way. A timeout counts
//! as `Timedout`; anything else is `Unreachable`. Raw ICMP stays outside
//! this repo; an ICMP engine would implement [`Prober`] the same way.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use pingmux_core::{now_nanos, ResolvedTarget, SuccessCount, TargetId};

use crate::{
    EchoOutcome, ProbeError, ProbeSettings, Prober, ProberFactory, RawResult,
    RESULT_CHANNEL_CAPACITY,
};

/// Port probed when a target line names no port.
pub const DEFAULT_PROBE_PORT: u16 = 80;

/// Rolling window of the last N probe outcomes for one target.
#[derive(Debug)]
struct SuccessWindow {
    slots: VecDeque<bool>,
    capacity: usize,
}

impl SuccessWindow {
    fn new(capacity: usize) -> Self {
        Self {
            slots: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    fn record(&mut self, success: bool) {
        if self.slots.len() == self.capacity {
            self.slots.pop_front();
        }
        self.slots.push_back(success);
    }

    fn count(&self) -> u64 {
        self.slots.iter().filter(|s| **s).count() as u64
    }
}

#[derive(Debug)]
struct TargetState {
    id: TargetId,
    requested: String,
    comment: String,
    addr: SocketAddrV4,
    window: Mutex<SuccessWindow>,
}

/// Probe engine measuring TCP connect round-trip time.
#[derive(Debug)]
pub struct TcpProber {
    settings: ProbeSettings,
    targets: Mutex<Vec<Arc<TargetState>>>,
    results_tx: mpsc::Sender<RawResult>,
    results_rx: Mutex<Option<mpsc::Receiver<RawResult>>>,
}

impl TcpProber {
    pub fn new(settings: ProbeSettings) -> Self {
        let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        Self {
            settings,
            targets: Mutex::new(Vec::new()),
            results_tx,
            results_rx: Mutex::new(Some(results_rx)),
        }
    }

    /// Split `host`, `host:port`, `a.b.c.d` or `a.b.c.d:port` into host and
    /// port parts.
    fn split_address(address: &str) -> Result<(&str, u16), ProbeError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ProbeError::InvalidTarget(address.to_string()));
        }
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| ProbeError::InvalidTarget(address.to_string()))?;
                Ok((host, port))
            }
            Some(_) => Err(ProbeError::InvalidTarget(address.to_string())),
            None => Ok((address, DEFAULT_PROBE_PORT)),
        }
    }

    async fn resolve(host: &str, port: u16) -> Result<SocketAddrV4, ProbeError> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(SocketAddrV4::new(ip, port));
        }
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| ProbeError::Resolve {
                target: host.to_string(),
                source,
            })?;
        addrs
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(v4),
                SocketAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| ProbeError::Resolve {
                target: host.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no IPv4 address",
                ),
            })
    }

    async fn connect_once(source: Ipv4Addr, addr: SocketAddrV4) -> std::io::Result<()> {
        let socket = tokio::net::TcpSocket::new_v4()?;
        if !source.is_unspecified() {
            socket.bind(SocketAddr::V4(SocketAddrV4::new(source, 0)))?;
        }
        let stream = socket.connect(SocketAddr::V4(addr)).await?;
        drop(stream);
        Ok(())
    }

    async fn probe_target(
        target: Arc<TargetState>,
        settings: ProbeSettings,
        tx: mpsc::Sender<RawResult>,
        scope: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut sequence: u64 = 0;

        loop {
            tokio::select! {
                _ = scope.cancelled() => return,
                _ = ticker.tick() => {}
            }

            sequence += 1;
            let sent_at_nanos = now_nanos();
            let attempt = tokio::time::timeout(
                settings.timeout,
                Self::connect_once(settings.source_addr, target.addr),
            );
            let outcome = match attempt.await {
                Ok(Ok(())) => EchoOutcome::Reply,
                // A refusal is still a response from the host.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    EchoOutcome::Reply
                }
                Ok(Err(_)) => EchoOutcome::Unreachable,
                Err(_) => EchoOutcome::Timedout,
            };
            let received_at_nanos = if outcome == EchoOutcome::Reply {
                now_nanos()
            } else {
                0
            };

            target.window.lock().record(outcome == EchoOutcome::Reply);
            trace!(target = %target.addr, sequence, ?outcome, "probe");

            let result = RawResult {
                target_id: target.id,
                outcome,
                sequence,
                sent_at_nanos,
                received_at_nanos,
                peer: None,
            };
            tokio::select! {
                _ = scope.cancelled() => return,
                _ = tx.send(result) => {}
            }
        }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn add_target(&self, address: &str, comment: &str) -> Result<TargetId, ProbeError> {
        let (host, port) = Self::split_address(address)?;
        let addr = Self::resolve(host, port).await?;

        let mut targets = self.targets.lock();
        let id = TargetId::new(targets.len() as u32);
        targets.push(Arc::new(TargetState {
            id,
            requested: address.trim().to_string(),
            comment: comment.to_string(),
            addr,
            window: Mutex::new(SuccessWindow::new(self.settings.window)),
        }));
        debug!(%id, target = %addr, "target accepted");
        Ok(id)
    }

    fn info(&self) -> Vec<ResolvedTarget> {
        self.targets
            .lock()
            .iter()
            .map(|t| ResolvedTarget {
                id: t.id,
                requested: t.requested.clone(),
                resolved: *t.addr.ip(),
                comment: t.comment.clone(),
            })
            .collect()
    }

    fn success_counts(&self) -> Vec<SuccessCount> {
        self.targets
            .lock()
            .iter()
            .map(|t| SuccessCount {
                target_id: t.id,
                count: t.window.lock().count(),
            })
            .collect()
    }

    fn take_results(&self) -> Option<mpsc::Receiver<RawResult>> {
        self.results_rx.lock().take()
    }

    async fn run(&self, scope: CancellationToken) {
        let targets: Vec<Arc<TargetState>> = self.targets.lock().clone();
        let mut workers = JoinSet::new();
        for target in targets {
            workers.spawn(Self::probe_target(
                target,
                self.settings,
                self.results_tx.clone(),
                scope.clone(),
            ));
        }
        while workers.join_next().await.is_some() {}
    }
}

/// Factory producing [`TcpProber`]s, one per job.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpProberFactory;

#[async_trait]
impl ProberFactory for TcpProberFactory {
    async fn build(&self, settings: ProbeSettings) -> Result<Arc<dyn Prober>, ProbeError> {
        Ok(Arc::new(TcpProber::new(settings)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_bare_host_uses_default_port() {
        let (host, port) = TcpProber::split_address("example.net").unwrap();
        assert_eq!(host, "example.net");
        assert_eq!(port, DEFAULT_PROBE_PORT);
    }

    #[test]
    fn split_host_with_port() {
        let (host, port) = TcpProber::split_address("192.0.2.9:443").unwrap();
        assert_eq!(host, "192.0.2.9");
        assert_eq!(port, 443);
    }

    #[test]
    fn split_rejects_garbage() {
        assert!(TcpProber::split_address("").is_err());
        assert!(TcpProber::split_address("   ").is_err());
        assert!(TcpProber::split_address("host:notaport").is_err());
        assert!(TcpProber::split_address(":443").is_err());
    }

    #[tokio::test]
    async fn add_target_assigns_sequential_ids() {
        let prober = TcpProber::new(ProbeSettings::default());
        let a = prober.add_target("192.0.2.1", "first").await.unwrap();
        let b = prober.add_target("192.0.2.2:22", "second").await.unwrap();
        assert_eq!(a, TargetId::new(0));
        assert_eq!(b, TargetId::new(1));

        let info = prober.info();
        assert_eq!(info.len(), 2);
        assert_eq!(info[0].resolved, Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(info[1].requested, "192.0.2.2:22");
        assert_eq!(info[1].comment, "second");
    }

    #[tokio::test]
    async fn add_target_rejects_malformed_line() {
        let prober = TcpProber::new(ProbeSettings::default());
        let err = prober.add_target(":7", "").await.unwrap_err();
        assert!(matches!(err, ProbeError::InvalidTarget(_)));
        assert!(prober.info().is_empty());
    }

    #[test]
    fn window_counts_recent_successes_only() {
        let mut window = SuccessWindow::new(3);
        for success in [true, true, true, false, false] {
            window.record(success);
        }
        // Only [true, false, false] remain.
        assert_eq!(window.count(), 1);
    }

    #[test]
    fn window_capacity_is_at_least_one() {
        let mut window = SuccessWindow::new(0);
        window.record(true);
        assert_eq!(window.count(), 1);
        window.record(false);
        assert_eq!(window.count(), 0);
    }

    #[tokio::test]
    async fn take_results_is_single_consumer() {
        let prober = TcpProber::new(ProbeSettings::default());
        assert!(prober.take_results().is_some());
        assert!(prober.take_results().is_none());
    }

    #[tokio::test]
    async fn counts_follow_target_order() {
        let prober = TcpProber::new(ProbeSettings::default());
        prober.add_target("192.0.2.1", "").await.unwrap();
        prober.add_target("192.0.2.2", "").await.unwrap();
        let counts = prober.success_counts();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].target_id, TargetId::new(0));
        assert_eq!(counts[1].target_id, TargetId::new(1));
        assert_eq!(counts[0].count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancellation() {
        let prober = Arc::new(TcpProber::new(ProbeSettings::default()));
        let scope = CancellationToken::new();

        let runner = {
            let prober = Arc::clone(&prober);
            let scope = scope.clone();
            tokio::spawn(async move { prober.run(scope).await })
        };

        scope.cancel();
        runner.await.unwrap();
    }
}
