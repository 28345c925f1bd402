//! Admission control and lifecycle management for probe jobs.
//!
//! `submit` reserves a random id and queues the request; the dispatch loop
//! builds the job asynchronously, publishes it into the reserved registry
//! entry, runs it to completion, and reaps the entry afterwards. The bounded
//! submission queue is the only admission-control point: when construction
//! falls behind, submitters wait for a queue slot.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use pingmux_core::{
    now_nanos, EffectiveParams, JobId, JobInfo, JobSummary, ProbeResult, StartRequest,
    StatisticsSnapshot,
};
use pingmux_probe::{ProbeSettings, ProberFactory};
use pingmux_settings::Limits;

use crate::job::JobInstance;
use crate::registry::JobRegistry;

/// How many random ids a submit may draw before concluding the registry is
/// saturated.
const MAX_ID_DRAWS: u32 = u16::MAX as u32 + 1;

/// Knobs the launcher takes from server configuration.
#[derive(Clone, Copy, Debug)]
pub struct LauncherConfig {
    pub limits: Limits,
    /// Source address for outbound probes.
    pub source_addr: Ipv4Addr,
    /// Queue capacity handed to every stream subscriber.
    pub stream_buffer: usize,
    /// Capacity of the submission queue.
    pub submit_queue: usize,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            source_addr: Ipv4Addr::UNSPECIFIED,
            stream_buffer: 5,
            submit_queue: 10,
        }
    }
}

struct LaunchRequest {
    id: JobId,
    request: StartRequest,
}

/// Accepts start requests and owns every job task spawned on their behalf.
pub struct JobLauncher {
    registry: Arc<JobRegistry>,
    limits: Limits,
    source_addr: Ipv4Addr,
    stream_buffer: usize,
    factory: Arc<dyn ProberFactory>,
    submit_tx: mpsc::Sender<LaunchRequest>,
    submit_rx: Mutex<Option<mpsc::Receiver<LaunchRequest>>>,
    root: CancellationToken,
    tracker: TaskTracker,
}

impl JobLauncher {
    pub fn new(config: LauncherConfig, factory: Arc<dyn ProberFactory>) -> Arc<Self> {
        let (submit_tx, submit_rx) = mpsc::channel(config.submit_queue.max(1));
        Arc::new(Self {
            registry: Arc::new(JobRegistry::new()),
            limits: config.limits,
            source_addr: config.source_addr,
            stream_buffer: config.stream_buffer.max(1),
            factory,
            submit_tx,
            submit_rx: Mutex::new(Some(submit_rx)),
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Reserve an id and queue the request for dispatch.
    ///
    /// Returns `JobId::NONE` when the request names no targets, when the id
    /// space is saturated, or when the launcher is already shut down. A full
    /// submission queue makes this call wait, not fail.
    pub async fn submit(&self, request: StartRequest) -> JobId {
        if request.targets.is_empty() {
            debug!("start request without targets refused");
            return JobId::NONE;
        }

        let mut id = JobId::NONE;
        for _ in 0..MAX_ID_DRAWS {
            let candidate = JobId::random();
            if self.registry.try_reserve(candidate).is_some() {
                id = candidate;
                break;
            }
        }
        if id.is_none() {
            warn!("job id space saturated, start request refused");
            return JobId::NONE;
        }

        if self.submit_tx.send(LaunchRequest { id, request }).await.is_err() {
            // Dispatch loop is gone; give the reservation back.
            self.registry.remove(id);
            return JobId::NONE;
        }
        id
    }

    /// Drive the dispatch loop until shutdown. Call once, from its own task.
    pub async fn run(self: Arc<Self>) {
        let Some(mut submit_rx) = self.submit_rx.lock().take() else {
            return;
        };
        loop {
            tokio::select! {
                _ = self.root.cancelled() => break,
                queued = submit_rx.recv() => match queued {
                    Some(LaunchRequest { id, request }) => {
                        let launcher = Arc::clone(&self);
                        self.tracker.spawn(launcher.construct_job(id, request));
                    }
                    None => break,
                },
            }
        }
        // Requests still queued at shutdown never run; release their ids.
        while let Ok(LaunchRequest { id, .. }) = submit_rx.try_recv() {
            self.registry.remove(id);
        }
    }

    fn clamp(&self, request: &StartRequest) -> EffectiveParams {
        EffectiveParams {
            interval_ms: self.limits.interval_ms.clamp(request.interval_ms),
            timeout_ms: self.limits.timeout_ms.clamp(request.timeout_ms),
            lifetime_s: self.limits.lifetime_s.clamp(request.lifetime_s),
            stats_window: self.limits.stats_window.clamp(request.stats_window),
            stats_interval_s: self.limits.stats_interval_s.clamp(request.stats_interval_s),
        }
    }

    async fn construct_job(self: Arc<Self>, id: JobId, request: StartRequest) {
        let params = self.clamp(&request);
        let settings = ProbeSettings {
            interval: Duration::from_millis(params.interval_ms),
            timeout: Duration::from_millis(params.timeout_ms),
            window: params.stats_window as usize,
            source_addr: self.source_addr,
        };

        let prober = match self.factory.build(settings).await {
            Ok(prober) => prober,
            Err(error) => {
                warn!(%id, %error, "probe engine construction failed");
                self.registry.remove(id);
                return;
            }
        };

        let mut accepted = 0usize;
        for target in &request.targets {
            match prober.add_target(&target.address, &target.comment).await {
                Ok(_) => accepted += 1,
                Err(error) => {
                    warn!(%id, target = %target.address, %error, "target rejected");
                }
            }
        }
        if accepted == 0 {
            warn!(%id, "no usable targets, job abandoned");
            self.registry.remove(id);
            return;
        }

        let scope = self.root.child_token();
        let started_at_nanos = now_nanos();
        // Lifetime zero means the job runs until stopped.
        let expires_at_nanos = if params.lifetime_s == 0 {
            0
        } else {
            started_at_nanos + Duration::from_secs(params.lifetime_s).as_nanos() as u64
        };

        let job = JobInstance::new(
            id,
            request.description,
            params,
            prober,
            scope.clone(),
            started_at_nanos,
            expires_at_nanos,
            self.stream_buffer,
        );

        if params.lifetime_s > 0 {
            let lifetime = Duration::from_secs(params.lifetime_s);
            let timer_scope = scope.clone();
            self.tracker.spawn(async move {
                tokio::select! {
                    _ = timer_scope.cancelled() => {}
                    _ = tokio::time::sleep(lifetime) => {
                        debug!(%id, "job lifetime expired");
                        timer_scope.cancel();
                    }
                }
            });
        }

        if !self.registry.publish(id, Arc::clone(&job)) {
            // The reservation vanished while we were building. Never run.
            scope.cancel();
            return;
        }
        info!(%id, targets = accepted, "job started");

        job.run().await;
        self.registry.remove(id);
        debug!(%id, "job reaped");
    }

    /// Stop a job. A job still under construction is aborted: its
    /// reservation is removed so the built instance is never promoted and
    /// its engine never runs. Returns false for ids the registry does not
    /// know.
    pub async fn stop(&self, id: JobId) -> bool {
        let Some(entry) = self.registry.lookup(id) else {
            return false;
        };
        if let Some(job) = entry.record() {
            info!(%id, "job stop requested");
            job.stop();
            return true;
        }
        // Construction pending: pull the reservation out from under it.
        info!(%id, "pending job aborted");
        self.registry.remove(id);
        // If publication won the race after all, stop the job it installed.
        if let Some(job) = entry.record() {
            job.stop();
        }
        true
    }

    /// Summaries of every published job, oldest first.
    pub fn list(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<JobSummary> = self
            .registry
            .ready_jobs()
            .into_iter()
            .map(|job| JobSummary {
                id: job.id(),
                description: job.description().to_string(),
                started_at_nanos: job.started_at_nanos(),
                expires_at_nanos: job.expires_at_nanos(),
            })
            .collect();
        jobs.sort_by_key(|job| (job.started_at_nanos, job.id));
        jobs
    }

    /// Full description of one job. Waits through construction; unknown ids
    /// yield the empty record.
    pub async fn info(&self, id: JobId) -> JobInfo {
        let Some(entry) = self.registry.lookup(id) else {
            return JobInfo::default();
        };
        entry.ready().await;
        entry
            .record()
            .map(|job| job.info())
            .unwrap_or_default()
    }

    /// Open a result stream on a job. Waits through construction; `None`
    /// for unknown or abandoned ids.
    pub async fn subscribe_results(&self, id: JobId) -> Option<mpsc::Receiver<ProbeResult>> {
        let entry = self.registry.lookup(id)?;
        entry.ready().await;
        entry.record().map(|job| job.subscribe_results())
    }

    /// Open a statistics stream on a job. Same semantics as
    /// [`subscribe_results`](Self::subscribe_results).
    pub async fn subscribe_statistics(
        &self,
        id: JobId,
    ) -> Option<mpsc::Receiver<StatisticsSnapshot>> {
        let entry = self.registry.lookup(id)?;
        entry.ready().await;
        entry.record().map(|job| job.subscribe_statistics())
    }

    /// Cancel every job and wait up to `grace` for their tasks to finish.
    /// Returns false when the grace period expired with tasks still live.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        info!("launcher shutting down");
        self.root.cancel();
        self.tracker.close();
        tokio::time::timeout(grace, self.tracker.wait()).await.is_ok()
    }
}
