//! Scripted probe engine for deterministic tests without real sockets.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pingmux_core::{ResolvedTarget, SuccessCount, TargetId};

use crate::{
    EchoOutcome, ProbeError, ProbeSettings, Prober, ProberFactory, RawResult,
    RESULT_CHANNEL_CAPACITY,
};

/// Build a scripted raw result with the timestamps tests care about.
pub fn raw(target_id: u32, outcome: EchoOutcome, sequence: u64) -> RawResult {
    RawResult {
        target_id: TargetId::new(target_id),
        outcome,
        sequence,
        sent_at_nanos: sequence * 1_000,
        received_at_nanos: if outcome == EchoOutcome::Reply {
            sequence * 1_000 + 500
        } else {
            0
        },
        peer: None,
    }
}

/// Prober that replays a pre-programmed result script, then idles until
/// cancelled.
#[derive(Debug)]
pub struct MockProber {
    script: Vec<RawResult>,
    gap: Duration,
    counts: Mutex<Vec<u64>>,
    targets: Mutex<Vec<ResolvedTarget>>,
    results_tx: mpsc::Sender<RawResult>,
    results_rx: Mutex<Option<mpsc::Receiver<RawResult>>>,
}

impl MockProber {
    pub fn new(script: Vec<RawResult>) -> Self {
        let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        Self {
            script,
            gap: Duration::ZERO,
            counts: Mutex::new(Vec::new()),
            targets: Mutex::new(Vec::new()),
            results_tx,
            results_rx: Mutex::new(Some(results_rx)),
        }
    }

    /// Sleep this long before each scripted result.
    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    /// Fix the counters returned by `success_counts`, in target order.
    pub fn set_counts(&self, counts: Vec<u64>) {
        *self.counts.lock() = counts;
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn add_target(&self, address: &str, comment: &str) -> Result<TargetId, ProbeError> {
        if address.trim().is_empty() {
            return Err(ProbeError::InvalidTarget(address.to_string()));
        }
        let mut targets = self.targets.lock();
        let id = TargetId::new(targets.len() as u32);
        targets.push(ResolvedTarget {
            id,
            requested: address.to_string(),
            resolved: Ipv4Addr::new(127, 0, 0, 1),
            comment: comment.to_string(),
        });
        Ok(id)
    }

    fn info(&self) -> Vec<ResolvedTarget> {
        self.targets.lock().clone()
    }

    fn success_counts(&self) -> Vec<SuccessCount> {
        let counts = self.counts.lock();
        self.targets
            .lock()
            .iter()
            .enumerate()
            .map(|(i, t)| SuccessCount {
                target_id: t.id,
                count: counts.get(i).copied().unwrap_or(0),
            })
            .collect()
    }

    fn take_results(&self) -> Option<mpsc::Receiver<RawResult>> {
        self.results_rx.lock().take()
    }

    async fn run(&self, scope: CancellationToken) {
        for result in &self.script {
            if !self.gap.is_zero() {
                tokio::select! {
                    _ = scope.cancelled() => return,
                    _ = tokio::time::sleep(self.gap) => {}
                }
            }
            tokio::select! {
                _ = scope.cancelled() => return,
                _ = self.results_tx.send(*result) => {}
            }
        }
        scope.cancelled().await;
    }
}

/// Factory handing out [`MockProber`]s, with optional build delay and
/// scripted failure, so launcher tests can exercise slow and failing
/// construction.
pub struct MockProberFactory {
    script: Vec<RawResult>,
    counts: Vec<u64>,
    gap: Duration,
    build_delay: Duration,
    fail: bool,
    built: AtomicUsize,
}

impl Default for MockProberFactory {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MockProberFactory {
    pub fn new(script: Vec<RawResult>) -> Self {
        Self {
            script,
            counts: Vec::new(),
            gap: Duration::ZERO,
            build_delay: Duration::ZERO,
            fail: false,
            built: AtomicUsize::new(0),
        }
    }

    pub fn with_counts(mut self, counts: Vec<u64>) -> Self {
        self.counts = counts;
        self
    }

    /// Pace every built prober's script by this much per result. A zero-gap
    /// prober replays its whole script the instant the job starts, before a
    /// test task gets to subscribe, so scripted results land in an empty
    /// broadcast set and are dropped.
    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    /// Make every `build` sleep first, so tests can race a stop against
    /// construction.
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    /// Make every `build` fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// How many probers this factory has built.
    pub fn built(&self) -> usize {
        self.built.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ProberFactory for MockProberFactory {
    async fn build(&self, _settings: ProbeSettings) -> Result<Arc<dyn Prober>, ProbeError> {
        if self.fail {
            return Err(ProbeError::Engine("scripted build failure".into()));
        }
        if !self.build_delay.is_zero() {
            tokio::time::sleep(self.build_delay).await;
        }
        self.built.fetch_add(1, Ordering::Relaxed);
        let prober = MockProber::new(self.script.clone()).with_gap(self.gap);
        prober.set_counts(self.counts.clone());
        Ok(Arc::new(prober))
    }
}
