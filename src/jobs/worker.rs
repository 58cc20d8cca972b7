//! The sync worker: single consumer of the job queue.
//!
//! One spawned task polls the queue on a fixed tick and executes at most one
//! job per tick, inline. That gives both throughput constraints at once: no
//! two syncs ever run concurrently, and dispatches are at least
//! `dispatch_interval_ms` apart even when many jobs become due together
//! (stagger collapse, retries landing close to fresh jobs).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use super::queue::JobQueue;
use crate::sync::SyncOrchestrator;

/// Configuration for the sync worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Minimum interval between job dispatches (milliseconds)
    pub dispatch_interval_ms: u64,
    /// Worker name/identifier
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: 1000,
            name: "sync-worker".to_string(),
        }
    }
}

/// Statistics for the sync worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Total jobs dispatched
    pub processed: Arc<AtomicU64>,
    /// Jobs whose orchestration returned a report
    pub succeeded: Arc<AtomicU64>,
    /// Jobs handed back to the queue's retry policy
    pub failed: Arc<AtomicU64>,
}

impl WorkerStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown: tokio::sync::watch::Sender<bool>,
    stats: WorkerStats,
    join: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down. An in-flight job finishes first.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Get worker statistics.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait for the worker task to exit.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Consumes sync jobs from the queue and drives the orchestrator.
pub struct SyncWorker {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    orchestrator: Arc<SyncOrchestrator>,
    stats: WorkerStats,
}

impl SyncWorker {
    pub fn new(config: WorkerConfig, queue: Arc<JobQueue>, orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            config,
            queue,
            orchestrator,
            stats: WorkerStats::default(),
        }
    }

    /// Start the worker, returning a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
        let stats = self.stats.clone();

        let Self {
            config,
            queue,
            orchestrator,
            stats: task_stats,
        } = self;

        let join = tokio::spawn(async move {
            let mut dispatch = tokio::time::interval(std::time::Duration::from_millis(
                config.dispatch_interval_ms.max(1),
            ));
            dispatch.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                worker = %config.name,
                dispatch_interval_ms = config.dispatch_interval_ms,
                "sync worker started"
            );

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // A dropped sender counts as shutdown.
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = dispatch.tick() => {
                        dispatch_one(&config, &queue, &orchestrator, &task_stats).await;
                    }
                }
            }

            info!(worker = %config.name, "sync worker stopped");
        });

        WorkerHandle {
            shutdown: shutdown_tx,
            stats,
            join,
        }
    }
}

async fn dispatch_one(
    config: &WorkerConfig,
    queue: &JobQueue,
    orchestrator: &SyncOrchestrator,
    stats: &WorkerStats,
) {
    let mut job = match queue.next_due().await {
        Ok(Some(job)) => job,
        Ok(None) => return,
        Err(err) => {
            error!(worker = %config.name, error = %err, "queue poll failed");
            return;
        }
    };

    job.metadata.mark_running();
    stats.processed.fetch_add(1, Ordering::Relaxed);

    let tenant = job.data.tenant_id.clone();
    match orchestrator
        .sync_tenant(&job.data.tenant_id, &job.data.session_phone)
        .await
    {
        Ok(report) => {
            stats.succeeded.fetch_add(1, Ordering::Relaxed);
            info!(
                worker = %config.name,
                job = %job.metadata.id,
                tenant = %tenant,
                contacts = report.contacts_count,
                groups = report.groups_count,
                "job completed"
            );
            if let Err(err) = queue.complete(job).await {
                error!(worker = %config.name, error = %err, "failed to record completed job");
            }
        }
        Err(err) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                worker = %config.name,
                job = %job.metadata.id,
                tenant = %tenant,
                error = %err,
                "job failed"
            );
            if let Err(err) = queue.fail(job, &err.to_string()).await {
                error!(worker = %config.name, error = %err, "failed to requeue job");
            }
        }
    }
}
