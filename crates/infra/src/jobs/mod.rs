//! Background job system with retry, backoff, and dead-letter handling.
//!
//! Jobs carry a dotted kind and a JSON payload. The executor routes each job
//! to the most specific registered handler, reschedules failures per the
//! job's [`RetryPolicy`], and moves jobs that run out of attempts to the
//! dead-letter list where they can be inspected and requeued.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecuteError, ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobId, JobKind, JobResult, JobStatus, RetryPolicy,
};
