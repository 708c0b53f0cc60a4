//! Job storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest claimable job whose schedule has come due, marking it
    /// running. `None` when nothing is due.
    fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    /// Move a job out of the queue into the dead-letter list.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Put a dead-lettered job back in the queue with a fresh attempt budget.
    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    pub cancelled: usize,
}

/// In-memory job store.
///
/// A job that reaches `Completed` is dropped from the queue on `update`; only
/// the count survives, so `get` on a finished job returns `None`. Dead letters
/// are kept until retried.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
    completed: AtomicUsize,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Jobs still held in the queue (pending, running, failed or cancelled).
    pub fn queued_len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> JobStoreError {
    JobStoreError::Storage("lock poisoned".to_string())
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        if let Some(job) = jobs.get(&job_id) {
            return Ok(Some(job.clone()));
        }
        drop(jobs);
        let dls = self.dead_letters.read().map_err(poisoned)?;
        Ok(dls.get(&job_id).map(|e| e.job.clone()))
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if !jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        if job.status == JobStatus::Completed {
            jobs.remove(&job.id);
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            jobs.insert(job.id, job.clone());
        }
        Ok(())
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let now = Utc::now();

        let next = jobs
            .values()
            .filter(|j| j.status.is_claimable() && j.is_ready(now))
            .min_by_key(|j| (j.created_at, j.id.as_uuid().to_owned()))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_running();
                job.clone()
            })
        }))
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let mut dls = self.dead_letters.write().map_err(poisoned)?;

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dead_letters.read().map_err(poisoned)?;
        let mut entries: Vec<_> = dls.values().cloned().collect();
        entries.sort_by_key(|e| e.dead_lettered_at);
        entries.truncate(limit);
        Ok(entries)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let mut dls = self.dead_letters.write().map_err(poisoned)?;

        let entry = dls.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = Utc::now();
        job.history.clear();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let dls = self.dead_letters.read().map_err(poisoned)?;

        let mut stats = JobStats {
            completed: self.completed.load(Ordering::Relaxed),
            dead_lettered: dls.len(),
            ..JobStats::default()
        };
        for job in jobs.values() {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next()
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(limit)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(job_id)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobKind;

    fn job() -> Job {
        Job::new(JobKind::new("test"), serde_json::json!({}))
    }

    #[test]
    fn enqueue_and_claim() {
        let store = InMemoryJobStore::new();
        let job_id = store.enqueue(job()).unwrap();

        let claimed = store.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, job_id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempt, 1);

        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn claims_oldest_first() {
        let store = InMemoryJobStore::new();
        let first = store.enqueue(job()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = store.enqueue(job()).unwrap();

        assert_eq!(store.claim_next().unwrap().unwrap().id, first);
        assert_eq!(store.claim_next().unwrap().unwrap().id, second);
    }

    #[test]
    fn delayed_job_is_not_claimed_early() {
        let store = InMemoryJobStore::new();
        store
            .enqueue(job().delayed(std::time::Duration::from_secs(60)))
            .unwrap();
        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn dead_letter_and_retry() {
        let store = InMemoryJobStore::new();
        let job_id = store.enqueue(job()).unwrap();

        let claimed = store.claim_next().unwrap().unwrap();
        store.dead_letter(claimed, "gave up".to_string()).unwrap();

        assert_eq!(store.stats().unwrap().dead_lettered, 1);
        let dls = store.list_dead_letters(10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].reason, "gave up");

        let retried = store.retry_dead_letter(job_id).unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.attempt, 0);
        assert!(store.list_dead_letters(10).unwrap().is_empty());
    }

    #[test]
    fn completed_jobs_leave_the_queue() {
        let store = InMemoryJobStore::new();
        let first = store.enqueue(job()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = store.enqueue(job()).unwrap();

        let mut done = store.claim_next().unwrap().unwrap();
        assert_eq!(done.id, first);
        done.mark_completed(Utc::now());
        store.update(&done).unwrap();

        assert_eq!(store.queued_len(), 1);
        assert!(store.get(first).unwrap().is_none());
        assert!(store.get(second).unwrap().is_some());
        assert_eq!(store.stats().unwrap().completed, 1);
        assert_eq!(store.update(&done), Err(JobStoreError::NotFound(done.id)));
    }

    #[test]
    fn stats_track_status() {
        let store = InMemoryJobStore::new();
        for _ in 0..4 {
            store.enqueue(job()).unwrap();
        }
        store.claim_next().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.running, 1);
    }
}
