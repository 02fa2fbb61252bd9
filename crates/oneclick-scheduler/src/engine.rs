use std::sync::Arc;
use std::time::Duration;

use oneclick_core::config::SchedulerConfig;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    clock::{Clock, SystemClock},
    error::{Result, SchedulerError},
    executor::Executor,
    pool::{PoolStats, WorkerPool},
    retry::RetryPolicy,
    store::JobStore,
    types::{Job, JobStatus, Outcome},
};

/// Timing knobs for the polling loop.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    pub check_interval: Duration,
    pub shutdown_grace: Duration,
    /// `None` disables the abandoned-execution sweep.
    pub stale_after: Option<Duration>,
}

impl SchedulerOptions {
    pub fn from_config(cfg: &SchedulerConfig) -> Self {
        Self {
            check_interval: cfg.check_interval(),
            shutdown_grace: cfg.shutdown_grace(),
            stale_after: cfg.stale_after(),
        }
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// What a single tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Abandoned executions resolved by the sweep.
    pub recovered: usize,
    /// Jobs claimed and handed to the pool.
    pub dispatched: usize,
    /// True when the backlog was full and nothing was claimed.
    pub saturated: bool,
}

/// The polling trigger: claims due jobs, runs them on the worker pool and
/// records each outcome through the retry policy.
///
/// Everything it touches is injected, so tests can drive [`Scheduler::tick`]
/// by hand against a fake clock and a stub executor.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    executor: Arc<dyn Executor>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    pool: WorkerPool,
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<dyn Executor>,
        policy: RetryPolicy,
        pool: WorkerPool,
    ) -> Self {
        Self {
            store,
            executor,
            policy,
            clock: Arc::new(SystemClock),
            pool,
            options: SchedulerOptions::default(),
        }
    }

    /// Build a scheduler from the `[scheduler]` config section.
    pub fn from_config(
        store: Arc<dyn JobStore>,
        executor: Arc<dyn Executor>,
        cfg: &SchedulerConfig,
    ) -> Self {
        Self::new(
            store,
            executor,
            RetryPolicy::from_config(cfg),
            WorkerPool::new(cfg.max_concurrency, cfg.max_queue),
        )
        .with_options(SchedulerOptions::from_config(cfg))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Run one sweep → claim → dispatch cycle.
    ///
    /// Returns once the claimed jobs are queued; their outcomes are recorded
    /// by the pool tasks. A store error during the claim aborts this tick only.
    pub fn tick(&self) -> Result<TickReport> {
        if self.pool.is_closed() {
            return Err(SchedulerError::ShuttingDown);
        }
        let mut report = TickReport {
            recovered: self.sweep_stale(),
            ..Default::default()
        };

        let capacity = self.pool.capacity();
        if capacity == 0 {
            let stats = self.pool.stats();
            warn!(
                queued = stats.queued,
                in_flight = stats.in_flight,
                "worker backlog full, skipping tick"
            );
            report.saturated = true;
            return Ok(report);
        }

        let now = self.clock.now();
        let claimed = self.store.claim_due(now, capacity)?;
        report.dispatched = claimed.len();
        if !claimed.is_empty() {
            info!(count = claimed.len(), "claimed due jobs");
        }
        for job in claimed {
            self.dispatch(job);
        }
        Ok(report)
    }

    /// Claim job `id` now, ignoring its schedule, and dispatch it.
    ///
    /// Fails with a conflict unless the job is `pending`, and with
    /// [`SchedulerError::Saturated`] while the backlog is full.
    pub fn execute_now(&self, id: Uuid) -> Result<Job> {
        if self.pool.is_closed() {
            return Err(SchedulerError::ShuttingDown);
        }
        if self.pool.capacity() == 0 {
            return Err(SchedulerError::Saturated);
        }
        let now = self.clock.now();
        match self.store.claim_one(id, now)? {
            Some(job) => {
                info!(job_id = %id, "manual execution requested");
                self.dispatch(job.clone());
                Ok(job)
            }
            None => match self.store.get_by_id(id)? {
                Some(job) => Err(SchedulerError::Conflict {
                    id,
                    from: job.status,
                    to: JobStatus::Executing,
                }),
                None => Err(SchedulerError::JobNotFound { id }),
            },
        }
    }

    /// Poll on the configured interval until `shutdown` turns `true`, then
    /// give in-flight work the grace period to finish.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.options.check_interval,
            executor = self.executor.name(),
            "scheduler started"
        );

        let mut interval = tokio::time::interval(self.options.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        error!(code = e.code(), "scheduler tick failed: {e}");
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Stop taking work and wait up to the grace period for running jobs.
    pub async fn shutdown(&self) {
        self.pool.close();
        let stats = self.pool.stats();
        info!(
            queued = stats.queued,
            in_flight = stats.in_flight,
            "scheduler shutting down, draining workers"
        );
        match tokio::time::timeout(self.options.shutdown_grace, self.pool.wait_idle()).await {
            Ok(()) => info!("scheduler stopped"),
            Err(_) => {
                let stats = self.pool.stats();
                warn!(
                    abandoned = stats.queued + stats.in_flight,
                    "grace period elapsed; unfinished jobs stay executing until the stale sweep"
                );
            }
        }
    }

    /// Wait for every dispatched job to be resolved.
    pub async fn wait_idle(&self) {
        self.pool.wait_idle().await;
    }

    /// Resolve executions that never reported back as a failed attempt.
    fn sweep_stale(&self) -> usize {
        let Some(stale_after) = self.options.stale_after else {
            return 0;
        };
        let now = self.clock.now();
        let cutoff = match chrono::Duration::from_std(stale_after) {
            Ok(d) => now - d,
            Err(_) => return 0,
        };

        let stale = match self.store.list_stale(cutoff) {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(code = e.code(), "stale sweep query failed: {e}");
                return 0;
            }
        };

        let mut recovered = 0;
        for job in stale {
            let outcome = Outcome::TransientFailure(format!(
                "execution abandoned: no outcome recorded within {}s",
                stale_after.as_secs()
            ));
            let resolution = self.policy.resolve(&job, &outcome, now);
            match self.store.resolve(job.id, job.updated_at, &resolution, now) {
                Ok(()) => {
                    warn!(
                        job_id = %job.id,
                        status = %resolution.status,
                        retry_count = resolution.retry_count,
                        "recovered abandoned execution"
                    );
                    recovered += 1;
                }
                // Finished or started between the query and the update.
                Err(SchedulerError::Conflict { .. }) => {
                    debug!(job_id = %job.id, "stale job resolved concurrently");
                }
                Err(e) => error!(job_id = %job.id, code = e.code(), "stale job recovery failed: {e}"),
            }
        }
        recovered
    }

    fn dispatch(&self, job: Job) {
        let store = self.store.clone();
        let executor = self.executor.clone();
        let clock = self.clock.clone();
        let policy = self.policy;
        self.pool
            .spawn(async move { attempt(store, executor, clock, policy, job).await });
    }
}

/// Execute one claimed job and persist the outcome.
async fn attempt(
    store: Arc<dyn JobStore>,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    job: Job,
) {
    // A claim that sat in the queue past the stale cutoff may have been swept
    // and handed to another worker; only the current claim may run.
    let started_at = clock.now();
    match store.begin_attempt(job.id, job.updated_at, started_at) {
        Ok(true) => {}
        Ok(false) => {
            warn!(job_id = %job.id, "claim superseded while queued, attempt skipped");
            return;
        }
        Err(e) => {
            error!(job_id = %job.id, code = e.code(), "failed to start attempt: {e}");
            return;
        }
    }
    debug!(job_id = %job.id, attempt = job.retry_count + 1, "executing job");

    // Run the executor in its own task so a panic becomes a failed attempt.
    let outcome = {
        let job = job.clone();
        match tokio::spawn(async move { executor.execute(&job).await }).await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::TransientFailure(format!("executor aborted: {e}")),
        }
    };

    let now = clock.now();
    let resolution = policy.resolve(&job, &outcome, now);
    match store.resolve(job.id, started_at, &resolution, now) {
        Ok(()) => match resolution.status {
            JobStatus::Completed => info!(job_id = %job.id, "job completed"),
            JobStatus::Pending => warn!(
                job_id = %job.id,
                retry_count = resolution.retry_count,
                next_attempt = ?resolution.schedule_time,
                error = outcome.detail().unwrap_or_default(),
                "attempt failed, job requeued"
            ),
            status => error!(
                job_id = %job.id,
                %status,
                retry_count = resolution.retry_count,
                error = outcome.detail().unwrap_or_default(),
                "job failed"
            ),
        },
        // The job keeps its last committed state; the stale sweep reclaims it.
        Err(e) => error!(
            job_id = %job.id,
            code = e.code(),
            "failed to record outcome: {e}"
        ),
    }
}
