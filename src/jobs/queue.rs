//! Durable delayed job queue with bounded completion/failure histories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::job::{JobId, JobMetadata, JobStatus, QueuedJob, RetryPolicy, SyncJobData, SYNC_JOB_TYPE};
use crate::error::Result;

/// Trait for queue backends.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Schedule a job for delivery at its `deliver_at` time.
    async fn push(&self, job: QueuedJob) -> Result<()>;

    /// Remove and return one job whose `deliver_at` has passed, earliest
    /// first. Returns `None` when nothing is due.
    async fn pop_due(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>>;

    /// Retain a completed job, keeping at most `keep` records.
    async fn record_completed(&self, job: QueuedJob, keep: usize) -> Result<()>;

    /// Retain a permanently failed job, keeping at most `keep` records.
    async fn record_failed(&self, job: QueuedJob, keep: usize) -> Result<()>;

    /// Completed history, newest first.
    async fn completed(&self) -> Result<Vec<QueuedJob>>;

    /// Failed history, newest first.
    async fn failed(&self) -> Result<Vec<QueuedJob>>;

    /// Number of jobs waiting for delivery.
    async fn len(&self) -> Result<usize>;
}

struct DelayedJob(QueuedJob);

impl Eq for DelayedJob {}

impl PartialEq for DelayedJob {
    fn eq(&self, other: &Self) -> bool {
        self.0.metadata.id == other.0.metadata.id
    }
}

impl PartialOrd for DelayedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedJob {
    // Reversed so the BinaryHeap surfaces the earliest deliver_at first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .metadata
            .deliver_at
            .cmp(&self.0.metadata.deliver_at)
            .then_with(|| other.0.metadata.created_at.cmp(&self.0.metadata.created_at))
    }
}

/// In-memory queue backend for testing and development.
#[derive(Default)]
pub struct InMemoryQueueBackend {
    delayed: tokio::sync::Mutex<BinaryHeap<DelayedJob>>,
    completed: tokio::sync::Mutex<VecDeque<QueuedJob>>,
    failed: tokio::sync::Mutex<VecDeque<QueuedJob>>,
}

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the waiting jobs, earliest deliver_at first.
    pub async fn pending(&self) -> Vec<QueuedJob> {
        let delayed = self.delayed.lock().await;
        let mut jobs: Vec<QueuedJob> = delayed.iter().map(|d| d.0.clone()).collect();
        jobs.sort_by_key(|j| j.metadata.deliver_at);
        jobs
    }
}

fn push_bounded(history: &mut VecDeque<QueuedJob>, job: QueuedJob, keep: usize) {
    history.push_front(job);
    history.truncate(keep);
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn push(&self, job: QueuedJob) -> Result<()> {
        self.delayed.lock().await.push(DelayedJob(job));
        Ok(())
    }

    async fn pop_due(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>> {
        let mut delayed = self.delayed.lock().await;
        let due = delayed
            .peek()
            .map(|d| d.0.metadata.deliver_at <= now)
            .unwrap_or(false);
        Ok(if due {
            delayed.pop().map(|d| d.0)
        } else {
            None
        })
    }

    async fn record_completed(&self, job: QueuedJob, keep: usize) -> Result<()> {
        let mut completed = self.completed.lock().await;
        push_bounded(&mut completed, job, keep);
        Ok(())
    }

    async fn record_failed(&self, job: QueuedJob, keep: usize) -> Result<()> {
        let mut failed = self.failed.lock().await;
        push_bounded(&mut failed, job, keep);
        Ok(())
    }

    async fn completed(&self) -> Result<Vec<QueuedJob>> {
        Ok(self.completed.lock().await.iter().cloned().collect())
    }

    async fn failed(&self) -> Result<Vec<QueuedJob>> {
        Ok(self.failed.lock().await.iter().cloned().collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.delayed.lock().await.len())
    }
}

/// Redis-backed queue backend for production use.
///
/// Delayed jobs live in a sorted set scored by deliver-at epoch millis, so
/// they survive process restarts; histories are capped lists. The pop path
/// assumes the single-consumer deployment this service runs as.
pub struct RedisQueueBackend {
    client: redis::Client,
    delayed_key: String,
    completed_key: String,
    failed_key: String,
}

impl RedisQueueBackend {
    /// Create a new Redis queue backend rooted at `queue_key`.
    pub fn new(client: redis::Client, queue_key: impl Into<String>) -> Self {
        let queue_key = queue_key.into();
        Self {
            client,
            delayed_key: format!("{queue_key}:delayed"),
            completed_key: format!("{queue_key}:completed"),
            failed_key: format!("{queue_key}:failed"),
        }
    }

    async fn get_conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn record(&self, key: &str, job: &QueuedJob, keep: usize) -> Result<()> {
        let serialized = serde_json::to_string(job)?;
        let mut conn = self.get_conn().await?;

        redis::cmd("LPUSH")
            .arg(key)
            .arg(&serialized)
            .query_async::<_, i64>(&mut conn)
            .await?;

        if keep == 0 {
            redis::cmd("DEL")
                .arg(key)
                .query_async::<_, i64>(&mut conn)
                .await?;
        } else {
            redis::cmd("LTRIM")
                .arg(key)
                .arg(0)
                .arg(keep as i64 - 1)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }

        Ok(())
    }

    async fn history(&self, key: &str) -> Result<Vec<QueuedJob>> {
        let mut conn = self.get_conn().await?;
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::with_capacity(raw.len());
        for entry in raw {
            jobs.push(serde_json::from_str(&entry)?);
        }
        Ok(jobs)
    }
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn push(&self, job: QueuedJob) -> Result<()> {
        let serialized = serde_json::to_string(&job)?;
        let mut conn = self.get_conn().await?;

        redis::cmd("ZADD")
            .arg(&self.delayed_key)
            .arg(job.metadata.deliver_at.timestamp_millis())
            .arg(&serialized)
            .query_async::<_, i64>(&mut conn)
            .await?;

        debug!(job = %job.metadata.id, queue = %self.delayed_key, "job scheduled");
        Ok(())
    }

    async fn pop_due(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>> {
        let mut conn = self.get_conn().await?;

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&self.delayed_key)
            .arg("-inf")
            .arg(now.timestamp_millis())
            .arg("LIMIT")
            .arg(0)
            .arg(1)
            .query_async(&mut conn)
            .await?;

        let Some(member) = due.into_iter().next() else {
            return Ok(None);
        };

        let removed: i64 = redis::cmd("ZREM")
            .arg(&self.delayed_key)
            .arg(&member)
            .query_async(&mut conn)
            .await?;
        if removed == 0 {
            // Another consumer claimed it first; nothing to hand out.
            return Ok(None);
        }

        let job: QueuedJob = serde_json::from_str(&member)?;
        Ok(Some(job))
    }

    async fn record_completed(&self, job: QueuedJob, keep: usize) -> Result<()> {
        self.record(&self.completed_key, &job, keep).await
    }

    async fn record_failed(&self, job: QueuedJob, keep: usize) -> Result<()> {
        self.record(&self.failed_key, &job, keep).await
    }

    async fn completed(&self) -> Result<Vec<QueuedJob>> {
        self.history(&self.completed_key).await
    }

    async fn failed(&self) -> Result<Vec<QueuedJob>> {
        self.history(&self.failed_key).await
    }

    async fn len(&self) -> Result<usize> {
        let mut conn = self.get_conn().await?;
        let count: usize = redis::cmd("ZCARD")
            .arg(&self.delayed_key)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }
}

/// The sync job queue.
///
/// Delivery is at-least-once and payloads are never deduplicated: enqueueing
/// one tenant twice yields two independent jobs.
pub struct JobQueue {
    backend: Arc<dyn QueueBackend>,
}

impl JobQueue {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }

    /// Create a new in-memory job queue (for testing).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryQueueBackend::new()))
    }

    /// Enqueue a sync request for delivery no earlier than `delay` from now
    /// (best effort, not exact).
    pub async fn enqueue(
        &self,
        data: SyncJobData,
        delay: Duration,
        policy: RetryPolicy,
    ) -> Result<JobId> {
        let deliver_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        let job = QueuedJob {
            metadata: JobMetadata::new(SYNC_JOB_TYPE, deliver_at),
            policy,
            data,
        };
        let id = job.metadata.id;
        self.backend.push(job).await?;
        Ok(id)
    }

    /// Next job whose delivery time has passed, if any.
    pub async fn next_due(&self) -> Result<Option<QueuedJob>> {
        self.backend.pop_due(Utc::now()).await
    }

    /// Mark a job completed and retain it in the bounded history.
    pub async fn complete(&self, mut job: QueuedJob) -> Result<()> {
        job.metadata.mark_completed();
        let keep = job.policy.keep_completed;
        self.backend.record_completed(job, keep).await
    }

    /// Report a consumer failure.
    ///
    /// Requeues the job after its backoff while attempts remain; otherwise
    /// marks it dead and retains it in the bounded failed history — it is
    /// never silently dropped. Returns `true` when the job was requeued.
    pub async fn fail(&self, mut job: QueuedJob, error: &str) -> Result<bool> {
        job.metadata.last_error = Some(error.to_string());

        if job.metadata.attempts < job.policy.max_attempts {
            let delay = job.policy.backoff.delay_for_attempt(job.metadata.attempts);
            job.metadata.status = JobStatus::Pending;
            job.metadata.deliver_at =
                Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
            warn!(
                job = %job.metadata.id,
                attempt = job.metadata.attempts,
                retry_in_secs = delay.as_secs(),
                "job failed, requeued"
            );
            self.backend.push(job).await?;
            Ok(true)
        } else {
            error!(
                job = %job.metadata.id,
                attempts = job.metadata.attempts,
                error,
                "job failed permanently"
            );
            job.metadata.mark_dead(error);
            let keep = job.policy.keep_failed;
            self.backend.record_failed(job, keep).await?;
            Ok(false)
        }
    }

    /// Completed history, newest first.
    pub async fn completed_jobs(&self) -> Result<Vec<QueuedJob>> {
        self.backend.completed().await
    }

    /// Failed history, newest first.
    pub async fn failed_jobs(&self) -> Result<Vec<QueuedJob>> {
        self.backend.failed().await
    }

    /// Number of jobs waiting for delivery.
    pub async fn len(&self) -> Result<usize> {
        self.backend.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(tenant: &str) -> SyncJobData {
        SyncJobData {
            tenant_id: tenant.to_string(),
            session_phone: String::new(),
        }
    }

    #[tokio::test]
    async fn delayed_job_is_not_delivered_early() {
        let queue = JobQueue::in_memory();
        queue
            .enqueue(data("t1"), Duration::from_secs(3600), RetryPolicy::default())
            .await
            .unwrap();

        assert!(queue.next_due().await.unwrap().is_none());
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn due_jobs_are_delivered_earliest_first() {
        let queue = JobQueue::in_memory();
        let first = queue
            .enqueue(data("t1"), Duration::ZERO, RetryPolicy::default())
            .await
            .unwrap();
        let second = queue
            .enqueue(data("t2"), Duration::ZERO, RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(queue.next_due().await.unwrap().unwrap().metadata.id, first);
        assert_eq!(queue.next_due().await.unwrap().unwrap().metadata.id, second);
        assert!(queue.next_due().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn identical_payloads_are_independent_jobs() {
        let queue = JobQueue::in_memory();
        queue
            .enqueue(data("t1"), Duration::ZERO, RetryPolicy::default())
            .await
            .unwrap();
        queue
            .enqueue(data("t1"), Duration::ZERO, RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(queue.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_job_is_requeued_until_attempts_are_spent() {
        let queue = JobQueue::in_memory();
        queue
            .enqueue(data("t1"), Duration::ZERO, RetryPolicy::fixed(2, 0))
            .await
            .unwrap();

        // First attempt fails: one retry remains.
        let mut job = queue.next_due().await.unwrap().unwrap();
        job.metadata.mark_running();
        assert!(queue.fail(job, "broker hiccup").await.unwrap());
        assert_eq!(queue.len().await.unwrap(), 1);
        assert!(queue.failed_jobs().await.unwrap().is_empty());

        // Second attempt fails: the job is dead, no third attempt.
        let mut job = queue.next_due().await.unwrap().unwrap();
        assert_eq!(job.metadata.attempts, 1);
        job.metadata.mark_running();
        assert!(!queue.fail(job, "broker hiccup").await.unwrap());
        assert_eq!(queue.len().await.unwrap(), 0);

        let failed = queue.failed_jobs().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].metadata.status, JobStatus::Dead);
        assert_eq!(failed[0].metadata.attempts, 2);
        assert_eq!(failed[0].metadata.last_error.as_deref(), Some("broker hiccup"));
    }

    #[tokio::test]
    async fn completed_history_is_bounded() {
        let queue = JobQueue::in_memory();
        let policy = RetryPolicy::default().with_retention(2, 2);

        for i in 0..3 {
            queue
                .enqueue(data(&format!("t{i}")), Duration::ZERO, policy.clone())
                .await
                .unwrap();
            let job = queue.next_due().await.unwrap().unwrap();
            queue.complete(job).await.unwrap();
        }

        let completed = queue.completed_jobs().await.unwrap();
        assert_eq!(completed.len(), 2);
        // Newest first.
        assert_eq!(completed[0].data.tenant_id, "t2");
        assert_eq!(completed[1].data.tenant_id, "t1");
    }
}
