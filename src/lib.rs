//! # chatsync
//!
//! Scheduled synchronization of tenant contact and group lists from a
//! messaging-provider API into Postgres.
//!
//! ## Architecture
//!
//! ```text
//! TenantScheduler ──▶ JobQueue ──▶ SyncWorker ──▶ SyncOrchestrator ──▶ repos
//!   (cron trigger)    (Redis,        (1 job/s,      (per-tenant            │
//!    staggered         delayed,       serial)        state machine)        ▼
//!    enqueue)          retry)                                          Postgres
//! ```
//!
//! Delivery is at-least-once: a job may run more than once under retry, and
//! every effect is an idempotent natural-key upsert. Business failures (the
//! upstream instance being offline, an upstream call erroring) are recorded
//! into the tenant's sync status and returned inside [`sync::SyncReport`];
//! only infrastructure failures reach the queue's retry policy.

pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod observability;
pub mod repos;
pub mod sync;
pub mod upstream;

pub use error::{ChatsyncError, Result};
