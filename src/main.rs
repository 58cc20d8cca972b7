//! chatsync server - main entry point.
//!
//! Wires the process-wide singletons (store pool, broker client), starts the
//! sync worker, and registers the cron trigger that fans tenants out into
//! staggered jobs. Startup failures exit non-zero; a termination signal lets
//! the in-flight job finish before tearing the connections down.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use chatsync_core::config::Config;
use chatsync_core::db::Database;
use chatsync_core::jobs::{
    JobQueue, RedisQueueBackend, SchedulerConfig, SyncWorker, TenantScheduler, WorkerConfig,
};
use chatsync_core::observability;
use chatsync_core::repos::{ContactRepo, GroupRepo, PgSessionRepo, PgSyncStatusRepo};
use chatsync_core::sync::SyncOrchestrator;
use chatsync_core::upstream::UpstreamClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    observability::init(&config.observability);

    info!(version = env!("CARGO_PKG_VERSION"), "starting chatsync");

    // Store handle: established once, shared by every repository.
    let db = Database::new(&config.database).await?;
    db.migrate().await?;
    db.health_check().await?;
    info!("connected to database");

    // Broker handle: likewise process-wide.
    let redis_client = redis::Client::open(config.redis.url.as_str())?;
    let backend = Arc::new(RedisQueueBackend::new(
        redis_client,
        config.redis.queue.clone(),
    ));
    let queue = Arc::new(JobQueue::new(backend));
    info!(queue = %config.redis.queue, "job queue ready");

    let upstream = UpstreamClient::new(&config.upstream)?;
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::new(ContactRepo::new(db.pool().clone())),
        Arc::new(GroupRepo::new(db.pool().clone())),
        Arc::new(PgSyncStatusRepo::new(db.pool().clone())),
        upstream,
    ));

    let worker = SyncWorker::new(
        WorkerConfig {
            dispatch_interval_ms: config.sync.dispatch_interval_ms,
            ..Default::default()
        },
        queue.clone(),
        orchestrator,
    );
    let worker_handle = worker.start();

    let scheduler = Arc::new(TenantScheduler::new(
        Arc::new(PgSessionRepo::new(db.pool().clone())),
        queue,
        SchedulerConfig::from_sync(&config.sync),
    ));

    let mut cron = JobScheduler::new().await?;
    let trigger = scheduler.clone();
    cron.add(Job::new_async(
        config.sync.cron.as_str(),
        move |_id, _sched| {
            let scheduler = trigger.clone();
            Box::pin(async move {
                info!("sync trigger fired");
                match scheduler.schedule_all().await {
                    Ok(scheduled) => info!(scheduled, "sync jobs scheduled"),
                    Err(err) => error!(error = %err, "failed to schedule sync jobs"),
                }
            })
        },
    )?)
    .await?;
    cron.start().await?;
    info!(cron = %config.sync.cron, "sync trigger scheduled");

    shutdown_signal().await;

    info!("shutting down");
    cron.shutdown().await?;
    worker_handle.shutdown();
    worker_handle.join().await;
    db.close().await;
    info!("shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
