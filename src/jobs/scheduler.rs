//! Tenant scheduler: turns one trigger firing into staggered sync jobs.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::job::{RetryPolicy, SyncJobData};
use super::queue::JobQueue;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::repos::SessionRepo;

/// Stagger and per-job policy applied to every scheduled sync.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay added per tenant position in the enumeration
    pub stagger: Duration,
    /// Retry/retention policy attached to each job
    pub policy: RetryPolicy,
}

impl SchedulerConfig {
    pub fn from_sync(config: &SyncConfig) -> Self {
        Self {
            stagger: Duration::from_secs(config.stagger_secs),
            policy: RetryPolicy::fixed(config.attempts, config.backoff_secs)
                .with_retention(config.keep_completed, config.keep_failed),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_sync(&SyncConfig::default())
    }
}

/// Enumerates tenant sessions and enqueues one staggered job per tenant.
pub struct TenantScheduler {
    sessions: Arc<dyn SessionRepo>,
    queue: Arc<JobQueue>,
    config: SchedulerConfig,
}

impl TenantScheduler {
    pub fn new(sessions: Arc<dyn SessionRepo>, queue: Arc<JobQueue>, config: SchedulerConfig) -> Self {
        Self {
            sessions,
            queue,
            config,
        }
    }

    /// Enqueue one sync job per known tenant, the i-th delayed by
    /// `i * stagger`. Returns the number of jobs enqueued.
    ///
    /// The trigger wrapper logs an `Err` instead of crashing; the next
    /// firing gets a fresh attempt.
    pub async fn schedule_all(&self) -> Result<usize> {
        let sessions = self.sessions.find_all().await?;
        if sessions.is_empty() {
            warn!("no tenant sessions found, nothing to schedule");
            return Ok(0);
        }

        info!(tenants = sessions.len(), "scheduling sync jobs");

        for (i, session) in sessions.iter().enumerate() {
            let delay = self.config.stagger * i as u32;
            let data = SyncJobData {
                tenant_id: session.tenant_id.clone(),
                session_phone: session.phone_number.clone().unwrap_or_default(),
            };
            let id = self
                .queue
                .enqueue(data, delay, self.config.policy.clone())
                .await?;
            info!(
                job = %id,
                tenant = %session.tenant_id,
                delay_secs = delay.as_secs(),
                "queued sync"
            );
        }

        Ok(sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::queue::InMemoryQueueBackend;
    use crate::repos::TenantSession;
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    struct FakeSessions(Vec<TenantSession>);

    #[async_trait]
    impl SessionRepo for FakeSessions {
        async fn find_all(&self) -> Result<Vec<TenantSession>> {
            Ok(self.0.clone())
        }

        async fn find_by_tenant(&self, tenant_id: &str) -> Result<Option<TenantSession>> {
            Ok(self.0.iter().find(|s| s.tenant_id == tenant_id).cloned())
        }
    }

    fn session(tenant: &str) -> TenantSession {
        let now = Utc::now();
        TenantSession {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            instance_id: None,
            phone_number: Some(format!("55{tenant}")),
            status: Some("active".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn enqueues_one_staggered_job_per_tenant() {
        let backend = Arc::new(InMemoryQueueBackend::new());
        let queue = Arc::new(JobQueue::new(backend.clone()));
        let sessions = Arc::new(FakeSessions(vec![
            session("a"),
            session("b"),
            session("c"),
        ]));

        let scheduler = TenantScheduler::new(sessions, queue.clone(), SchedulerConfig::default());
        let scheduled = scheduler.schedule_all().await.unwrap();

        assert_eq!(scheduled, 3);
        assert_eq!(queue.len().await.unwrap(), 3);

        let pending = backend.pending().await;
        assert_eq!(pending[0].data.tenant_id, "a");
        assert_eq!(pending[1].data.tenant_id, "b");
        assert_eq!(pending[2].data.tenant_id, "c");
        for (i, job) in pending.iter().enumerate() {
            let offset = (job.metadata.deliver_at - pending[0].metadata.deliver_at).num_seconds();
            assert_eq!(offset, 60 * i as i64);
            assert_eq!(job.policy.max_attempts, 2);
            assert_eq!(job.policy.keep_completed, 20);
            assert_eq!(job.policy.keep_failed, 50);
        }
        assert_eq!(pending[1].data.session_phone, "55b");
    }

    #[tokio::test]
    async fn empty_tenant_list_schedules_nothing() {
        let queue = Arc::new(JobQueue::in_memory());
        let scheduler = TenantScheduler::new(
            Arc::new(FakeSessions(Vec::new())),
            queue.clone(),
            SchedulerConfig::default(),
        );

        assert_eq!(scheduler.schedule_all().await.unwrap(), 0);
        assert_eq!(queue.len().await.unwrap(), 0);
    }
}
