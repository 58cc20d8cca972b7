//! Background sync job system.
//!
//! ```text
//! ┌───────────┐    ┌───────────┐    ┌───────────┐    ┌──────────────┐
//! │ Scheduler │───▶│   Queue   │───▶│  Worker   │───▶│ Orchestrator │
//! │ (cron,    │    │ (delayed, │    │ (serial,  │    │ (per-tenant  │
//! │  stagger) │    │  retry)   │    │  1 job/s) │    │  sync)       │
//! └───────────┘    └───────────┘    └───────────┘    └──────────────┘
//! ```
//!
//! The queue delivers at-least-once: a job the consumer fails is requeued
//! after its fixed backoff until its attempts are spent, then retained in a
//! bounded failed history. Completed jobs are retained in a bounded history
//! as well. Identical payloads are not deduplicated.

pub mod job;
pub mod queue;
pub mod scheduler;
pub mod worker;

pub use job::{
    BackoffStrategy, JobId, JobMetadata, JobStatus, QueuedJob, RetryPolicy, SyncJobData,
    SYNC_JOB_TYPE,
};
pub use queue::{InMemoryQueueBackend, JobQueue, QueueBackend, RedisQueueBackend};
pub use scheduler::{SchedulerConfig, TenantScheduler};
pub use worker::{SyncWorker, WorkerConfig, WorkerHandle, WorkerStats};
