//! Job executor with retry and backoff logic.

use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobKind, JobResult, JobStatus};

/// Job handler function type.
pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

/// Job executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often to poll for new jobs
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Handle to control a running executor.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Request graceful shutdown and wait for the loop to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        lock_stats(&self.stats).clone()
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

fn lock_stats(stats: &Mutex<ExecutorStats>) -> MutexGuard<'_, ExecutorStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Why a single execution did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecuteError {
    #[error("no handler for job kind: {0}")]
    NoHandler(JobKind),
    #[error("job failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Background job executor.
///
/// Polls a job store for due jobs, runs them with registered handlers, and
/// reschedules or dead-letters failures per each job's retry policy.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: Vec<(String, JobHandler)>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register a handler for an exact kind, a `prefix.*` family, or `*`.
    ///
    /// Registering the same pattern twice replaces the earlier handler.
    pub fn register_handler<F>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        let pattern = kind_pattern.into();
        self.handlers.retain(|(p, _)| *p != pattern);
        self.handlers.push((pattern, Box::new(handler)));
    }

    /// Most specific handler for `kind`: exact match, then the longest
    /// matching prefix pattern, then the wildcard.
    fn get_handler(&self, kind: &JobKind) -> Option<&JobHandler> {
        self.handlers
            .iter()
            .filter(|(pattern, _)| kind.matches(pattern))
            .max_by_key(|(pattern, _)| match pattern.as_str() {
                "*" => 0,
                p if p == kind.as_str() => usize::MAX,
                p => p.len(),
            })
            .map(|(_, handler)| handler)
    }

    /// Spawn the executor on a background thread.
    pub fn spawn(self, config: JobExecutorConfig) -> std::io::Result<JobExecutorHandle>
    where
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                executor_loop(self, config, shutdown_rx, stats_clone);
            })?;

        Ok(JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }

    /// Execute a single job and persist the outcome.
    ///
    /// Accepts a job fresh from [`JobStore::claim_next`] (already running) or
    /// one that has not been started yet.
    pub fn execute_one(&self, job: &mut Job) -> Result<(), ExecuteError> {
        if job.status != JobStatus::Running {
            job.mark_running();
        }
        let started = Utc::now();

        let outcome = match self.get_handler(&job.kind) {
            Some(handler) => handler(job),
            None => {
                warn!(job_id = %job.id, kind = %job.kind, "no handler for job");
                JobResult::Failure(ExecuteError::NoHandler(job.kind.clone()).to_string())
            }
        };

        match outcome {
            JobResult::Success => {
                job.mark_completed(started);
                self.store.update(job)?;
                debug!(job_id = %job.id, kind = %job.kind, attempt = job.attempt, "job completed");
                Ok(())
            }
            JobResult::Failure(reason) => {
                job.mark_failed(reason.clone(), started);
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    error!(
                        job_id = %job.id,
                        kind = %job.kind,
                        attempts = job.attempt,
                        error = %reason,
                        "job dead-lettered"
                    );
                    self.store.dead_letter(job.clone(), reason.clone())?;
                } else {
                    warn!(
                        job_id = %job.id,
                        kind = %job.kind,
                        attempt = job.attempt,
                        error = %reason,
                        "job failed, retry scheduled"
                    );
                    self.store.update(job)?;
                }
                Err(ExecuteError::Failed(reason))
            }
        }
    }

    /// Claim and run every job that is due right now, returning how many ran.
    ///
    /// Retries scheduled in the future are left for a later call.
    pub fn run_pending(&self) -> Result<usize, JobStoreError> {
        let mut ran = 0;
        while let Some(mut job) = self.store.claim_next()? {
            ran += 1;
            match self.execute_one(&mut job) {
                Ok(()) | Err(ExecuteError::Failed(_)) | Err(ExecuteError::NoHandler(_)) => {}
                Err(ExecuteError::Store(e)) => return Err(e),
            }
        }
        Ok(ran)
    }
}

fn executor_loop<S: JobStore + 'static>(
    executor: JobExecutor<S>,
    config: JobExecutorConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(executor = %config.name, "job executor started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        lock_stats(&stats).uptime_secs = start_time.elapsed().as_secs();

        match executor.store.claim_next() {
            Ok(Some(mut job)) => {
                debug!(executor = %config.name, job_id = %job.id, kind = %job.kind, "claimed job");

                let result = executor.execute_one(&mut job);

                let mut s = lock_stats(&stats);
                s.jobs_processed += 1;
                match &result {
                    Ok(()) => s.jobs_succeeded += 1,
                    Err(_) => {
                        s.jobs_failed += 1;
                        if matches!(job.status, JobStatus::DeadLettered { .. }) {
                            s.jobs_dead_lettered += 1;
                        }
                    }
                }
                drop(s);

                if let Err(ExecuteError::Store(e)) = result {
                    error!(executor = %config.name, job_id = %job.id, error = %e, "failed to persist job outcome");
                }
            }
            Ok(None) => {
                thread::sleep(config.poll_interval);
            }
            Err(e) => {
                error!(executor = %config.name, error = %e, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(executor = %config.name, "job executor stopped");
}
