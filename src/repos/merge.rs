//! Generic point-lookup / bulk-merge repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use std::marker::PhantomData;
use uuid::Uuid;

use crate::error::Result;

/// An entity kind that can be merged by natural key.
///
/// Implementations supply the single-row upsert and the point lookup; the
/// surrounding transaction and counting live in [`PgEntityRepo`].
#[async_trait]
pub trait MergeEntity: Send + Sync + 'static {
    /// Draft supplied by callers. Carries the natural key and all merged
    /// fields; the surrogate id and timestamps are assigned by the store.
    type Draft: Send + Sync;
    /// Stored row shape.
    type Row: Send + Unpin;

    /// Upsert one draft matched on the natural key. Sets every provided field
    /// plus `updated_at`; `created_at` is written only when the match inserts.
    /// Returns rows affected (1 for insert and for update alike).
    async fn upsert(conn: &mut PgConnection, draft: &Self::Draft, now: DateTime<Utc>)
        -> Result<u64>;

    /// Point lookup by surrogate id.
    async fn fetch(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self::Row>>;
}

/// The bulk-merge seam consumed by the orchestrator.
#[async_trait]
pub trait BulkMerge<D>: Send + Sync {
    /// Merge drafts into the store.
    ///
    /// Returns the affected-row count: upserted + modified, conflated. This
    /// is "rows touched", not "distinct real-world entities" — duplicate
    /// drafts for one natural key each count. An empty input is a no-op
    /// returning 0, and re-merging identical drafts changes only `updated_at`.
    async fn merge_many(&self, drafts: &[D]) -> Result<u64>;
}

/// Postgres repository parameterized over an entity kind.
pub struct PgEntityRepo<E> {
    pool: PgPool,
    _entity: PhantomData<E>,
}

impl<E: MergeEntity> PgEntityRepo<E> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    /// Point lookup by surrogate id.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<E::Row>> {
        let mut conn = self.pool.acquire().await?;
        E::fetch(&mut conn, id).await
    }
}

#[async_trait]
impl<E: MergeEntity> BulkMerge<E::Draft> for PgEntityRepo<E> {
    async fn merge_many(&self, drafts: &[E::Draft]) -> Result<u64> {
        if drafts.is_empty() {
            return Ok(0);
        }

        // One timestamp per batch so every row in the merge carries the same
        // updated_at, and one transaction so the batch lands atomically.
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;
        for draft in drafts {
            affected += E::upsert(&mut tx, draft, now).await?;
        }
        tx.commit().await?;

        Ok(affected)
    }
}
