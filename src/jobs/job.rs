//! Job definitions: identity, status, payload, retry policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Job type under which tenant syncs are queued.
pub const SYNC_JOB_TYPE: &str = "sync-tenant";

/// Unique identifier for a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its deliver-at time
    Pending,
    /// Currently being executed
    Running,
    /// Finished successfully
    Completed,
    /// Failed with no attempts left
    Dead,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Dead)
    }
}

/// Payload of one tenant sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJobData {
    pub tenant_id: String,
    pub session_phone: String,
}

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed { delay_secs: u64 },
    /// Exponential increase in delay (initial * multiplier^attempt), capped
    Exponential {
        initial_delay_secs: u64,
        max_delay_secs: u64,
        multiplier: f64,
    },
}

impl BackoffStrategy {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs = match self {
            Self::Fixed { delay_secs } => *delay_secs,
            Self::Exponential {
                initial_delay_secs,
                max_delay_secs,
                multiplier,
            } => {
                let delay = (*initial_delay_secs as f64) * multiplier.powi(attempt as i32);
                delay.min(*max_delay_secs as f64) as u64
            }
        };

        Duration::from_secs(secs)
    }

    pub fn fixed(delay_secs: u64) -> Self {
        Self::Fixed { delay_secs }
    }
}

/// Per-job retry and retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed (first run included)
    pub max_attempts: u32,
    /// Backoff between attempts
    pub backoff: BackoffStrategy,
    /// Completed job records retained for inspection
    pub keep_completed: usize,
    /// Failed job records retained for inspection
    pub keep_failed: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: BackoffStrategy::fixed(60),
            keep_completed: 20,
            keep_failed: 50,
        }
    }
}

impl RetryPolicy {
    /// Fixed backoff with the given total attempts.
    pub fn fixed(max_attempts: u32, delay_secs: u64) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::fixed(delay_secs),
            ..Default::default()
        }
    }

    /// Override the history bounds.
    pub fn with_retention(mut self, keep_completed: usize, keep_failed: usize) -> Self {
        self.keep_completed = keep_completed;
        self.keep_failed = keep_failed;
        self
    }
}

/// Metadata associated with a queued job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    pub id: JobId,
    pub job_type: String,
    pub status: JobStatus,
    /// Number of execution attempts so far
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    /// Earliest time the queue may hand the job to a consumer
    pub deliver_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl JobMetadata {
    pub fn new(job_type: impl Into<String>, deliver_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            job_type: job_type.into(),
            status: JobStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            deliver_at,
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        self.attempts += 1;
    }

    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_dead(&mut self, error: &str) {
        self.status = JobStatus::Dead;
        self.finished_at = Some(Utc::now());
        self.last_error = Some(error.to_string());
    }
}

/// A job as stored in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub metadata: JobMetadata,
    pub policy: RetryPolicy,
    pub data: SyncJobData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn job_status_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Dead.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn backoff_fixed() {
        let backoff = BackoffStrategy::fixed(60);
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_secs(60));
        assert_eq!(backoff.delay_for_attempt(5), Duration::from_secs(60));
    }

    #[test]
    fn backoff_exponential_caps_at_max() {
        let backoff = BackoffStrategy::Exponential {
            initial_delay_secs: 1,
            max_delay_secs: 100,
            multiplier: 2.0,
        };
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(backoff.delay_for_attempt(10), Duration::from_secs(100));
    }

    #[test]
    fn metadata_transitions() {
        let mut meta = JobMetadata::new(SYNC_JOB_TYPE, Utc::now());
        assert_eq!(meta.status, JobStatus::Pending);
        assert_eq!(meta.attempts, 0);

        meta.mark_running();
        assert_eq!(meta.status, JobStatus::Running);
        assert_eq!(meta.attempts, 1);
        assert!(meta.started_at.is_some());

        meta.mark_dead("boom");
        assert_eq!(meta.status, JobStatus::Dead);
        assert!(meta.finished_at.is_some());
        assert_eq!(meta.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn queued_job_round_trips_through_json() {
        let job = QueuedJob {
            metadata: JobMetadata::new(SYNC_JOB_TYPE, Utc::now()),
            policy: RetryPolicy::fixed(2, 60).with_retention(20, 50),
            data: SyncJobData {
                tenant_id: "t1".to_string(),
                session_phone: "555".to_string(),
            },
        };

        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: QueuedJob = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.metadata.id, job.metadata.id);
        assert_eq!(decoded.data, job.data);
        assert_eq!(decoded.policy.max_attempts, 2);
    }
}
