//! One running probe job: the engine, its result relay, and its statistics
//! relay, all tied to a single cancellable scope.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use pingmux_core::{
    EffectiveParams, JobId, JobInfo, ProbeResult, ResultKind, StatisticsSnapshot,
};
use pingmux_probe::{EchoOutcome, Prober, RawResult};

use crate::broadcast::BroadcastSet;

/// Lifecycle of a job instance. Transitions are one-way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum JobStatus {
    /// Built but not yet running.
    Constructed = 0,
    /// All three loops are live.
    Running = 1,
    /// The scope is cancelled; loops are winding down.
    Draining = 2,
    /// All loops have returned and streams are closed.
    Terminated = 3,
}

impl JobStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => JobStatus::Constructed,
            1 => JobStatus::Running,
            2 => JobStatus::Draining,
            _ => JobStatus::Terminated,
        }
    }
}

/// Translate an engine-internal outcome into the public wire kind.
pub(crate) fn translate(raw: &RawResult) -> ProbeResult {
    let kind = match raw.outcome {
        EchoOutcome::Reply => ResultKind::Receive,
        EchoOutcome::LateReply => ResultKind::ReceiveAfterTimeout,
        EchoOutcome::TtlExceeded => ResultKind::TtlExceeded,
        EchoOutcome::Timedout => ResultKind::Timeout,
        EchoOutcome::Unreachable => ResultKind::Unknown,
    };
    ProbeResult {
        target_id: raw.target_id,
        kind,
        sequence: raw.sequence,
        sent_at_nanos: raw.sent_at_nanos,
        received_at_nanos: raw.received_at_nanos,
        peer: raw.peer,
    }
}

/// One probe job and everything that runs on its behalf.
///
/// `run` drives three loops under the job's scope: the probe engine itself,
/// the relay that translates raw engine results onto the result streams, and
/// the relay that snapshots rolling counters onto the statistics streams.
/// Whichever loop exits first cancels the scope, so the other two follow,
/// and `run` only returns once all three are done and both stream sets are
/// closed.
pub struct JobInstance {
    id: JobId,
    description: String,
    params: EffectiveParams,
    started_at_nanos: u64,
    expires_at_nanos: u64,
    prober: Arc<dyn Prober>,
    scope: CancellationToken,
    status: AtomicU8,
    results: BroadcastSet<ProbeResult>,
    statistics: BroadcastSet<StatisticsSnapshot>,
    stream_buffer: usize,
}

impl JobInstance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: JobId,
        description: String,
        params: EffectiveParams,
        prober: Arc<dyn Prober>,
        scope: CancellationToken,
        started_at_nanos: u64,
        expires_at_nanos: u64,
        stream_buffer: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            description,
            params,
            started_at_nanos,
            expires_at_nanos,
            prober,
            scope,
            status: AtomicU8::new(JobStatus::Constructed as u8),
            results: BroadcastSet::new(),
            statistics: BroadcastSet::new(),
            stream_buffer,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> EffectiveParams {
        self.params
    }

    pub fn started_at_nanos(&self) -> u64 {
        self.started_at_nanos
    }

    pub fn expires_at_nanos(&self) -> u64 {
        self.expires_at_nanos
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn info(&self) -> JobInfo {
        JobInfo {
            description: self.description.clone(),
            targets: self.prober.info(),
            params: self.params,
            started_at_nanos: self.started_at_nanos,
            expires_at_nanos: self.expires_at_nanos,
        }
    }

    /// Open a result stream with this job's configured queue capacity.
    pub fn subscribe_results(&self) -> mpsc::Receiver<ProbeResult> {
        self.results.subscribe(self.stream_buffer)
    }

    /// Open a statistics stream with this job's configured queue capacity.
    pub fn subscribe_statistics(&self) -> mpsc::Receiver<StatisticsSnapshot> {
        self.statistics.subscribe(self.stream_buffer)
    }

    /// Ask the job to wind down. Idempotent; `run` still owns the cleanup.
    pub fn stop(&self) {
        self.begin_drain();
    }

    fn begin_drain(&self) {
        let _ = self.status.compare_exchange(
            JobStatus::Running as u8,
            JobStatus::Draining as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.scope.cancel();
    }

    /// Run the job to completion. Returns only after the engine and both
    /// relays have exited and all subscriber streams are closed.
    pub async fn run(&self) {
        let Some(raw_rx) = self.prober.take_results() else {
            // The engine's result stream was already consumed; nothing can
            // run correctly, so terminate immediately.
            error!(id = %self.id, "probe engine result stream unavailable");
            self.scope.cancel();
            self.finish();
            return;
        };

        self.status
            .store(JobStatus::Running as u8, Ordering::Release);
        debug!(id = %self.id, "job running");

        tokio::join!(
            async {
                self.prober.run(self.scope.clone()).await;
                self.begin_drain();
            },
            async {
                self.relay_results(raw_rx).await;
                self.begin_drain();
            },
            async {
                self.relay_statistics().await;
                self.begin_drain();
            },
        );

        self.finish();
        debug!(id = %self.id, "job terminated");
    }

    fn finish(&self) {
        self.results.close_all();
        self.statistics.close_all();
        self.status
            .store(JobStatus::Terminated as u8, Ordering::Release);
    }

    async fn relay_results(&self, mut raw_rx: mpsc::Receiver<RawResult>) {
        loop {
            tokio::select! {
                _ = self.scope.cancelled() => return,
                raw = raw_rx.recv() => match raw {
                    Some(raw) => self.results.publish(&translate(&raw)),
                    None => return,
                },
            }
        }
    }

    async fn relay_statistics(&self) {
        let period = Duration::from_secs(self.params.stats_interval_s.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                _ = self.scope.cancelled() => return,
                _ = ticker.tick() => {
                    let snapshot = StatisticsSnapshot {
                        targets: self.prober.success_counts(),
                    };
                    self.statistics.publish(&snapshot);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pingmux_core::TargetId;
    use pingmux_probe::mock::{raw, MockProber};

    fn params() -> EffectiveParams {
        EffectiveParams {
            interval_ms: 1000,
            timeout_ms: 1000,
            lifetime_s: 60,
            stats_window: 10,
            stats_interval_s: 1,
        }
    }

    fn instance(prober: Arc<dyn Prober>) -> Arc<JobInstance> {
        JobInstance::new(
            JobId::new(7),
            "test job".into(),
            params(),
            prober,
            CancellationToken::new(),
            100,
            200,
            5,
        )
    }

    #[test]
    fn outcome_translation() {
        assert_eq!(
            translate(&raw(0, EchoOutcome::Reply, 1)).kind,
            ResultKind::Receive
        );
        assert_eq!(
            translate(&raw(0, EchoOutcome::LateReply, 1)).kind,
            ResultKind::ReceiveAfterTimeout
        );
        assert_eq!(
            translate(&raw(0, EchoOutcome::TtlExceeded, 1)).kind,
            ResultKind::TtlExceeded
        );
        assert_eq!(
            translate(&raw(0, EchoOutcome::Timedout, 1)).kind,
            ResultKind::Timeout
        );
        assert_eq!(
            translate(&raw(0, EchoOutcome::Unreachable, 1)).kind,
            ResultKind::Unknown
        );
    }

    #[tokio::test]
    async fn relays_results_in_script_order() {
        let prober = Arc::new(MockProber::new(vec![
            raw(0, EchoOutcome::Reply, 1),
            raw(0, EchoOutcome::Timedout, 2),
            raw(0, EchoOutcome::Reply, 3),
        ]));
        let job = instance(prober);
        let mut results = job.subscribe_results();

        let runner = {
            let job = Arc::clone(&job);
            tokio::spawn(async move { job.run().await })
        };

        let first = results.recv().await.unwrap();
        let second = results.recv().await.unwrap();
        let third = results.recv().await.unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(second.kind, ResultKind::Timeout);
        assert_eq!(third.sequence, 3);
        assert_eq!(first.target_id, TargetId::new(0));

        job.stop();
        runner.await.unwrap();
        assert_eq!(job.status(), JobStatus::Terminated);
    }

    #[tokio::test]
    async fn stop_closes_all_streams() {
        let job = instance(Arc::new(MockProber::new(Vec::new())));
        let mut results = job.subscribe_results();
        let mut stats = job.subscribe_statistics();

        let runner = {
            let job = Arc::clone(&job);
            tokio::spawn(async move { job.run().await })
        };

        job.stop();
        runner.await.unwrap();

        assert_eq!(results.recv().await, None);
        assert!(stats.recv().await.is_none());
        assert_eq!(job.status(), JobStatus::Terminated);
    }

    #[tokio::test]
    async fn subscriber_after_termination_gets_closed_stream() {
        let job = instance(Arc::new(MockProber::new(Vec::new())));

        let runner = {
            let job = Arc::clone(&job);
            tokio::spawn(async move { job.run().await })
        };
        job.stop();
        runner.await.unwrap();

        let mut late = job.subscribe_results();
        assert!(late.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn statistics_tick_on_the_configured_interval() {
        let prober = Arc::new(MockProber::new(Vec::new()));
        prober.add_target("stats.example", "").await.unwrap();
        prober.set_counts(vec![4]);
        let job = instance(prober);
        let mut stats = job.subscribe_statistics();

        let runner = {
            let job = Arc::clone(&job);
            tokio::spawn(async move { job.run().await })
        };

        let snapshot = stats.recv().await.unwrap();
        assert_eq!(snapshot.targets.len(), 1);
        assert_eq!(snapshot.targets[0].count, 4);

        job.stop();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn second_run_terminates_without_streams() {
        let prober = Arc::new(MockProber::new(Vec::new()));
        // Steal the result stream so run cannot operate.
        let _stolen = prober.take_results();

        let job = instance(prober);
        job.run().await;
        assert_eq!(job.status(), JobStatus::Terminated);
    }

    #[tokio::test]
    async fn info_reflects_engine_targets() {
        let prober = Arc::new(MockProber::new(Vec::new()));
        prober.add_target("192.0.2.1", "edge").await.unwrap();
        let job = instance(prober);

        let info = job.info();
        assert_eq!(info.description, "test job");
        assert_eq!(info.targets.len(), 1);
        assert_eq!(info.targets[0].comment, "edge");
        assert_eq!(info.params.stats_window, 10);
        assert_eq!(info.started_at_nanos, 100);
        assert_eq!(info.expires_at_nanos, 200);
    }
}
