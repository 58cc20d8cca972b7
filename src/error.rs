//! Crate-wide error type.
//!
//! Everything that crosses a component boundary converts into
//! [`ChatsyncError`] via `?`. These are the infrastructure failures of the
//! system: store, broker, upstream transport, serialization, configuration.
//! Business-level sync failures never appear here — the orchestrator folds
//! them into [`crate::sync::SyncReport::error`] instead, so the job queue's
//! retry policy only ever sees errors worth retrying.

use thiserror::Error;

/// A specialized Result type for chatsync operations.
pub type Result<T> = std::result::Result<T, ChatsyncError>;

#[derive(Debug, Error)]
pub enum ChatsyncError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("queue broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("upstream request error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
