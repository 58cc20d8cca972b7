//! Sync status repository.
//!
//! One row per `(tenant_id, session_phone)` — the durable record of a
//! tenant's sync lifecycle (`idle → syncing → idle-success | idle-error`).
//! Each run overwrites the previous record rather than appending.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncStatusRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub session_phone: String,
    pub is_syncing: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub total_contacts: i64,
    pub total_groups: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial status write. `is_syncing` and `error` are written on every call;
/// `last_sync` and the totals only when present, otherwise the stored values
/// are kept.
///
/// Invariant: `is_syncing` is true only between [`SyncStatusUpdate::started`]
/// and the terminal write of the same run. A process crash in between leaves
/// the record at `is_syncing = true` until the tenant's next run overwrites
/// it.
#[derive(Debug, Clone, Default)]
pub struct SyncStatusUpdate {
    pub is_syncing: bool,
    pub error: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub total_contacts: Option<i64>,
    pub total_groups: Option<i64>,
}

impl SyncStatusUpdate {
    /// Marks a run in-flight and clears any previous error.
    pub fn started() -> Self {
        Self {
            is_syncing: true,
            ..Default::default()
        }
    }

    /// Terminal write for a successful run.
    pub fn succeeded(last_sync: DateTime<Utc>, total_contacts: i64, total_groups: i64) -> Self {
        Self {
            is_syncing: false,
            error: None,
            last_sync: Some(last_sync),
            total_contacts: Some(total_contacts),
            total_groups: Some(total_groups),
        }
    }

    /// Terminal write for a failed run. Keeps the previous `last_sync` and
    /// totals.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            is_syncing: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait SyncStatusRepo: Send + Sync {
    /// Upsert the status row keyed by `(tenant_id, session_phone)`.
    async fn upsert(
        &self,
        tenant_id: &str,
        session_phone: &str,
        update: SyncStatusUpdate,
    ) -> Result<()>;

    /// Point lookup by natural key.
    async fn find(&self, tenant_id: &str, session_phone: &str)
        -> Result<Option<SyncStatusRow>>;
}

pub struct PgSyncStatusRepo {
    pool: PgPool,
}

impl PgSyncStatusRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStatusRepo for PgSyncStatusRepo {
    async fn upsert(
        &self,
        tenant_id: &str,
        session_phone: &str,
        update: SyncStatusUpdate,
    ) -> Result<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sync_status (id, tenant_id, session_phone, is_syncing,
                                     last_sync, total_contacts, total_groups,
                                     error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, 0), COALESCE($7, 0), $8, $9, $9)
            ON CONFLICT (tenant_id, session_phone) DO UPDATE SET
                is_syncing = EXCLUDED.is_syncing,
                last_sync = COALESCE($5, sync_status.last_sync),
                total_contacts = COALESCE($6, sync_status.total_contacts),
                total_groups = COALESCE($7, sync_status.total_groups),
                error = EXCLUDED.error,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(session_phone)
        .bind(update.is_syncing)
        .bind(update.last_sync)
        .bind(update.total_contacts)
        .bind(update.total_groups)
        .bind(&update.error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        tenant_id: &str,
        session_phone: &str,
    ) -> Result<Option<SyncStatusRow>> {
        let row = sqlx::query_as::<_, SyncStatusRow>(
            r#"
            SELECT id, tenant_id, session_phone, is_syncing, last_sync,
                   total_contacts, total_groups, error, created_at, updated_at
            FROM sync_status
            WHERE tenant_id = $1 AND session_phone = $2
            "#,
        )
        .bind(tenant_id)
        .bind(session_phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
