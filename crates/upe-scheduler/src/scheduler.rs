//! Priority job scheduler with bounded concurrency and retries
//!
//! All bookkeeping lives behind one mutex. Dispatch ("check capacity, pop,
//! mark running") and completion handling each run inside a single critical
//! section, so concurrent completions can never push the number of executing
//! attempts past `max_concurrent`. Dispatch is work-conserving: every
//! released slot is refilled immediately.
//!
//! A slot belongs to a [`SlotLease`], not to the attempt's task. It is freed
//! when the last clone of the lease drops, which for a timed-out attempt may
//! be after its outcome was recorded. Attempts are spawned only after the
//! lock is released.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use upe_config::{Config, PRIORITY_RANGE, SchedulerSettings};
use upe_utils::error::{ErrorInfo, ValidationError};
use upe_utils::logging::job_span;

use crate::handler::JobHandler;
use crate::job::{
    CancelFlag, JobContext, JobError, JobId, JobOptions, JobState, JobStatus, JobSubmission,
    SchedulerStats,
};

/// Scheduler-wide limits and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub max_concurrent: usize,
    pub default_max_attempts: u32,
    pub default_priority: u8,
    /// Per-attempt limit; an overrunning attempt fails
    pub job_timeout: Option<Duration>,
    /// How long terminal jobs stay queryable
    pub retention: Duration,
    /// Upper bound on retained terminal jobs
    pub max_retained: usize,
}

impl SchedulerOptions {
    #[must_use]
    pub fn from_settings(settings: &SchedulerSettings) -> Self {
        Self {
            max_concurrent: settings.max_concurrent.max(1),
            default_max_attempts: settings.default_max_attempts.max(1),
            default_priority: settings.default_priority,
            job_timeout: settings.job_timeout_secs.map(Duration::from_secs),
            retention: Duration::from_secs(settings.job_retention_secs),
            max_retained: settings.max_retained_jobs,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::from_settings(&config.scheduler)
    }

    #[must_use]
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    #[must_use]
    pub const fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_retention(mut self, retention: Duration, max_retained: usize) -> Self {
        self.retention = retention;
        self.max_retained = max_retained;
        self
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from_settings(&SchedulerSettings::default())
    }
}

type QueueKey = (Reverse<u8>, u64);

#[derive(Debug)]
struct JobRecord {
    id: JobId,
    job_type: String,
    payload: serde_json::Value,
    priority: u8,
    attempts: u32,
    max_attempts: u32,
    state: JobState,
    cancel: CancelFlag,
    /// Position in the ready queue while eligible for dispatch
    queue_key: Option<QueueKey>,
    result: Option<serde_json::Value>,
    error: Option<ErrorInfo>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    fn status(&self) -> JobStatus {
        JobStatus {
            id: self.id.clone(),
            job_type: self.job_type.clone(),
            state: self.state,
            progress: self.state.progress(),
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            priority: self.priority,
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<JobId, JobRecord>,
    /// Highest priority first, then submission/requeue order
    ready: BTreeMap<QueueKey, JobId>,
    next_seq: u64,
    /// Leased slots, including those of cancelled or timed-out attempts
    /// whose work has not returned yet
    active: usize,
    peak_active: usize,
    /// Terminal jobs in the order they finished. A job cancelled while
    /// running joins only once its attempt has returned.
    terminal: VecDeque<(Instant, JobId)>,
}

impl State {
    fn enqueue(&mut self, id: &str) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(job) = self.jobs.get_mut(id) {
            let key = (Reverse(job.priority), seq);
            job.queue_key = Some(key);
            self.ready.insert(key, job.id.clone());
        }
    }

    fn mark_terminal(&mut self, id: &str, state: JobState) {
        if let Some(job) = self.jobs.get_mut(id) {
            job.state = state;
            job.finished_at = Some(Utc::now());
            self.terminal.push_back((Instant::now(), job.id.clone()));
        }
    }

    fn purge(&mut self, now: Instant, retention: Duration, max_retained: usize) -> usize {
        let mut purged = 0;
        while let Some((finished, _)) = self.terminal.front() {
            let expired = now.saturating_duration_since(*finished) >= retention;
            if !expired && self.terminal.len() <= max_retained {
                break;
            }
            if let Some((_, id)) = self.terminal.pop_front() {
                self.jobs.remove(&id);
                purged += 1;
            }
        }
        purged
    }
}

struct Shared {
    state: Mutex<State>,
    handler: Arc<dyn JobHandler>,
    options: SchedulerOptions,
    changed: Notify,
    runtime: Handle,
}

/// One concurrency slot held by a dispatched attempt.
///
/// The slot is released when the last clone drops. A handler that moves work
/// somewhere task cancellation cannot reach, such as `spawn_blocking`, should
/// move a clone along with it so the slot stays taken until the work returns.
#[derive(Clone)]
pub struct SlotLease(Arc<LeaseInner>);

struct LeaseInner {
    scheduler: JobScheduler,
    job_id: JobId,
}

impl Drop for LeaseInner {
    fn drop(&mut self) {
        self.scheduler.release_slot(&self.job_id);
    }
}

impl fmt::Debug for SlotLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotLease")
            .field("job_id", &self.0.job_id)
            .finish_non_exhaustive()
    }
}

/// Asynchronous front for job execution.
///
/// Cloning is cheap and every clone drives the same queue.
#[derive(Clone)]
pub struct JobScheduler {
    shared: Arc<Shared>,
}

impl fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobScheduler")
            .field("options", &self.shared.options)
            .field("stats", &self.get_stats())
            .finish()
    }
}

impl JobScheduler {
    /// Create a scheduler that spawns attempts on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn new(handler: Arc<dyn JobHandler>, options: SchedulerOptions) -> Self {
        Self::with_runtime(handler, options, Handle::current())
    }

    #[must_use]
    pub fn with_runtime(
        handler: Arc<dyn JobHandler>,
        options: SchedulerOptions,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                handler,
                options,
                changed: Notify::new(),
                runtime,
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> &SchedulerOptions {
        &self.shared.options
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a job and return its id without waiting for execution.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for an empty job type, a priority outside
    /// 1..=10 or zero attempts.
    pub fn add_job(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<JobSubmission, ValidationError> {
        let defaults = &self.shared.options;
        let priority = options.priority.unwrap_or(defaults.default_priority);
        let max_attempts = options.max_attempts.unwrap_or(defaults.default_max_attempts);

        if job_type.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "job_type".to_string(),
            });
        }
        let (lo, hi) = PRIORITY_RANGE;
        if !(lo..=hi).contains(&priority) {
            return Err(ValidationError::OutOfRange {
                field: "priority".to_string(),
                value: priority.to_string(),
                range: format!("[{lo}, {hi}]"),
            });
        }
        if max_attempts == 0 {
            return Err(ValidationError::OutOfRange {
                field: "max_attempts".to_string(),
                value: "0".to_string(),
                range: ">= 1".to_string(),
            });
        }

        let id = Uuid::new_v4().to_string();
        let delay = options.delay.filter(|d| !d.is_zero());
        let attempts = {
            let mut state = self.lock();
            state.purge(Instant::now(), defaults.retention, defaults.max_retained);
            state.jobs.insert(
                id.clone(),
                JobRecord {
                    id: id.clone(),
                    job_type: job_type.to_string(),
                    payload,
                    priority,
                    attempts: 0,
                    max_attempts,
                    state: JobState::Queued,
                    cancel: CancelFlag::NotRequested,
                    queue_key: None,
                    result: None,
                    error: None,
                    created_at: Utc::now(),
                    started_at: None,
                    finished_at: None,
                },
            );
            if delay.is_none() {
                state.enqueue(&id);
                self.dispatch_locked(&mut state)
            } else {
                Vec::new()
            }
        };
        self.spawn_attempts(attempts);
        debug!(job_id = %id, job_type, priority, max_attempts, "job queued");

        if let Some(delay) = delay {
            let this = self.clone();
            let delayed_id = id.clone();
            self.shared.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                this.release_delayed(&delayed_id);
            });
        }

        Ok(JobSubmission {
            job_id: id,
            status: JobState::Queued,
        })
    }

    fn release_delayed(&self, id: &str) {
        let attempts = {
            let mut state = self.lock();
            let eligible = state
                .jobs
                .get(id)
                .is_some_and(|j| j.state == JobState::Queued && j.queue_key.is_none());
            if eligible {
                state.enqueue(id);
                self.dispatch_locked(&mut state)
            } else {
                Vec::new()
            }
        };
        self.spawn_attempts(attempts);
    }

    fn release_slot(&self, id: &str) {
        let attempts = {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
            debug!(job_id = %id, active = state.active, "slot released");
            self.dispatch_locked(&mut state)
        };
        self.spawn_attempts(attempts);
        self.shared.changed.notify_waiters();
    }

    /// Mark queued jobs running while capacity remains and return their
    /// attempts. Caller holds the lock and must pass the result to
    /// [`Self::spawn_attempts`] after releasing it.
    #[must_use]
    fn dispatch_locked(&self, state: &mut State) -> Vec<JobContext> {
        let max = self.shared.options.max_concurrent;
        let mut dispatched = Vec::new();
        while state.active < max {
            let Some((_, id)) = state.ready.pop_first() else {
                break;
            };
            let Some(job) = state.jobs.get_mut(&id) else {
                continue;
            };
            if job.state != JobState::Queued {
                continue;
            }

            job.queue_key = None;
            job.state = JobState::Running;
            job.attempts += 1;
            job.started_at.get_or_insert_with(Utc::now);
            let ctx = JobContext {
                id: job.id.clone(),
                job_type: job.job_type.clone(),
                payload: job.payload.clone(),
                attempt: job.attempts,
                max_attempts: job.max_attempts,
                lease: SlotLease(Arc::new(LeaseInner {
                    scheduler: self.clone(),
                    job_id: job.id.clone(),
                })),
            };

            state.active += 1;
            state.peak_active = state.peak_active.max(state.active);
            debug!(
                job_id = %ctx.id,
                attempt = ctx.attempt,
                active = state.active,
                "job dispatched"
            );

            dispatched.push(ctx);
        }
        dispatched
    }

    fn spawn_attempts(&self, attempts: Vec<JobContext>) {
        for ctx in attempts {
            let this = self.clone();
            self.shared.runtime.spawn(async move { this.execute(ctx).await });
        }
    }

    async fn execute(self, ctx: JobContext) {
        let span = job_span(&ctx.id, &ctx.job_type, ctx.attempt);
        let id = ctx.id.clone();
        let lease = ctx.slot_lease();
        let handler = Arc::clone(&self.shared.handler);

        // A separate task isolates handler panics from scheduler bookkeeping
        let mut task = self
            .shared
            .runtime
            .spawn(async move { handler.handle(ctx).await }.instrument(span.clone()));

        let joined = match self.shared.options.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    Ok(Err(JobError::Timeout(limit)))
                }
            },
            None => (&mut task).await,
        };
        let outcome = joined.unwrap_or_else(|e| Err(JobError::Aborted(e.to_string())));

        span.in_scope(|| self.complete(&id, outcome));
        // Frees the slot unless the aborted handler left work holding a clone
        drop(lease);
    }

    /// Record an attempt's outcome. The slot itself is released by the lease.
    fn complete(&self, id: &str, outcome: Result<serde_json::Value, JobError>) {
        let mut guard = self.lock();
        let state = &mut *guard;

        let Some(job) = state.jobs.get_mut(id) else {
            return;
        };

        if job.cancel == CancelFlag::Requested {
            job.cancel = CancelFlag::Acknowledged;
            state.terminal.push_back((Instant::now(), id.to_string()));
            debug!(job_id = %id, "cancelled job finished, result discarded");
        } else {
            match outcome {
                Ok(value) => {
                    job.result = Some(value);
                    job.error = None;
                    info!(job_id = %id, attempts = job.attempts, "job completed");
                    state.mark_terminal(id, JobState::Completed);
                }
                Err(err) => {
                    job.error = Some(err.info());
                    if err.is_retryable() && job.attempts < job.max_attempts {
                        warn!(
                            job_id = %id,
                            attempt = job.attempts,
                            max_attempts = job.max_attempts,
                            error = %err,
                            "job attempt failed, requeueing"
                        );
                        job.state = JobState::Queued;
                        state.enqueue(id);
                    } else {
                        warn!(
                            job_id = %id,
                            attempts = job.attempts,
                            retryable = err.is_retryable(),
                            error = %err,
                            "job failed"
                        );
                        state.mark_terminal(id, JobState::Failed);
                    }
                }
            }
        }

        let attempts = self.dispatch_locked(state);
        drop(guard);
        self.spawn_attempts(attempts);
        self.shared.changed.notify_waiters();
    }

    /// Cancel a job.
    ///
    /// A queued job becomes `Cancelled` and is never dispatched. A running
    /// job is marked `Cancelled` but its attempt runs to completion and its
    /// outcome is discarded. Terminal jobs are left unchanged.
    ///
    /// Returns the job's state after the call, or `None` for unknown ids.
    pub fn cancel_job(&self, id: &str) -> Option<JobState> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let job = state.jobs.get_mut(id)?;

        match job.state {
            JobState::Queued => {
                if let Some(key) = job.queue_key.take() {
                    state.ready.remove(&key);
                }
                state.mark_terminal(id, JobState::Cancelled);
                info!(job_id = %id, "queued job cancelled");
            }
            JobState::Running => {
                job.cancel = CancelFlag::Requested;
                job.state = JobState::Cancelled;
                job.finished_at = Some(Utc::now());
                info!(job_id = %id, "running job marked cancelled");
            }
            terminal => return Some(terminal),
        }
        drop(guard);
        self.shared.changed.notify_waiters();
        Some(JobState::Cancelled)
    }

    #[must_use]
    pub fn get_job(&self, id: &str) -> Option<JobStatus> {
        self.lock().jobs.get(id).map(JobRecord::status)
    }

    #[must_use]
    pub fn get_stats(&self) -> SchedulerStats {
        let state = self.lock();
        let mut stats = SchedulerStats {
            total: state.jobs.len(),
            active_slots: state.active,
            max_concurrent: self.shared.options.max_concurrent,
            peak_active: state.peak_active,
            ..SchedulerStats::default()
        };
        for job in state.jobs.values() {
            match job.state {
                JobState::Queued => stats.queued += 1,
                JobState::Running => stats.running += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Drop terminal jobs past retention or beyond the retained-count cap.
    ///
    /// A job cancelled while running is kept until its attempt returns.
    pub fn purge_expired(&self) -> usize {
        let options = &self.shared.options;
        let purged = self
            .lock()
            .purge(Instant::now(), options.retention, options.max_retained);
        if purged > 0 {
            debug!(purged, "purged terminal jobs");
        }
        purged
    }

    /// Resolve once the job is terminal. `None` if the id is unknown or was
    /// purged.
    pub async fn wait_for(&self, id: &str) -> Option<JobStatus> {
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let status = self.get_job(id)?;
            if status.state.is_terminal() {
                return Some(status);
            }
            notified.await;
        }
    }

    /// Resolve once nothing is queued or executing.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let idle = {
                let state = self.lock();
                state.active == 0
                    && state
                        .jobs
                        .values()
                        .all(|j| j.state != JobState::Queued && j.state != JobState::Running)
            };
            if idle {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Succeed;

    #[async_trait]
    impl JobHandler for Succeed {
        async fn handle(&self, job: JobContext) -> Result<serde_json::Value, JobError> {
            Ok(json!({"attempt": job.attempt}))
        }
    }

    struct Gated(Arc<tokio::sync::Semaphore>);

    #[async_trait]
    impl JobHandler for Gated {
        async fn handle(&self, _job: JobContext) -> Result<serde_json::Value, JobError> {
            self.0.acquire().await.unwrap().forget();
            Ok(json!({}))
        }
    }

    fn scheduler(options: SchedulerOptions) -> JobScheduler {
        JobScheduler::new(Arc::new(Succeed), options)
    }

    #[tokio::test]
    async fn test_add_job_rejects_bad_options() {
        let s = scheduler(SchedulerOptions::default());
        assert!(matches!(
            s.add_job("compile", json!({}), JobOptions::default().priority(11)),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            s.add_job("compile", json!({}), JobOptions::default().priority(0)),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            s.add_job("compile", json!({}), JobOptions::default().max_attempts(0)),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            s.add_job(" ", json!({}), JobOptions::default()),
            Err(ValidationError::EmptyField { .. })
        ));
    }

    #[tokio::test]
    async fn test_submission_returns_queued() {
        let s = scheduler(SchedulerOptions::default());
        let submission = s.add_job("noop", json!({}), JobOptions::default()).unwrap();
        assert_eq!(submission.status, JobState::Queued);

        let status = s.wait_for(&submission.job_id).await.unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.attempts, 1);
        assert_eq!(status.result, Some(json!({"attempt": 1})));
    }

    #[tokio::test]
    async fn test_unknown_job_is_none() {
        let s = scheduler(SchedulerOptions::default());
        assert!(s.get_job("missing").is_none());
        assert!(s.cancel_job("missing").is_none());
        assert!(s.wait_for("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_delayed_job_waits_before_dispatch() {
        let s = scheduler(SchedulerOptions::default());
        let started = Instant::now();
        let submission = s
            .add_job(
                "noop",
                json!({}),
                JobOptions::default().delay(Duration::from_millis(30)),
            )
            .unwrap();
        assert_eq!(s.get_job(&submission.job_id).unwrap().state, JobState::Queued);

        let status = s.wait_for(&submission.job_id).await.unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_cancelled_delayed_job_never_runs() {
        let s = scheduler(SchedulerOptions::default());
        let submission = s
            .add_job(
                "noop",
                json!({}),
                JobOptions::default().delay(Duration::from_millis(20)),
            )
            .unwrap();
        assert_eq!(s.cancel_job(&submission.job_id), Some(JobState::Cancelled));
        tokio::time::sleep(Duration::from_millis(40)).await;

        let status = s.get_job(&submission.job_id).unwrap();
        assert_eq!(status.state, JobState::Cancelled);
        assert_eq!(status.attempts, 0);
    }

    #[tokio::test]
    async fn test_retention_count_cap() {
        let options = SchedulerOptions::default().with_retention(Duration::from_secs(3600), 2);
        let s = scheduler(options);
        let mut ids = Vec::new();
        for _ in 0..4 {
            let id = s.add_job("noop", json!({}), JobOptions::default()).unwrap().job_id;
            s.wait_for(&id).await.unwrap();
            ids.push(id);
        }

        s.purge_expired();
        assert_eq!(s.get_stats().total, 2);
        assert!(s.get_job(&ids[0]).is_none());
        assert!(s.get_job(&ids[3]).is_some());
    }

    #[tokio::test]
    async fn test_cancelled_running_job_outlives_retention_until_attempt_returns() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let s = JobScheduler::new(
            Arc::new(Gated(Arc::clone(&gate))),
            SchedulerOptions::default().with_retention(Duration::ZERO, 100),
        );
        let id = s.add_job("noop", json!({}), JobOptions::default()).unwrap().job_id;
        assert_eq!(s.cancel_job(&id), Some(JobState::Cancelled));

        assert_eq!(s.purge_expired(), 0);
        assert_eq!(s.get_job(&id).unwrap().state, JobState::Cancelled);
        assert_eq!(s.get_stats().active_slots, 1);

        gate.add_permits(1);
        s.wait_idle().await;
        assert_eq!(s.get_stats().active_slots, 0);
        assert_eq!(s.purge_expired(), 1);
        assert!(s.get_job(&id).is_none());
    }

    #[tokio::test]
    async fn test_retention_ttl() {
        let options = SchedulerOptions::default().with_retention(Duration::from_millis(10), 100);
        let s = scheduler(options);
        let id = s.add_job("noop", json!({}), JobOptions::default()).unwrap().job_id;
        s.wait_for(&id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(s.purge_expired(), 1);
        assert!(s.get_job(&id).is_none());
    }
}
