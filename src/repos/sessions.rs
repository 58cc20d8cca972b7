//! Tenant session repository.
//!
//! Sessions are provisioned by an external service; this core only reads
//! them to learn which tenants exist.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;

/// A provisioned tenant session.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TenantSession {
    pub id: Uuid,
    pub tenant_id: String,
    pub instance_id: Option<String>,
    pub phone_number: Option<String>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SessionRepo: Send + Sync {
    /// All known sessions, ordered by `tenant_id` so the scheduler's stagger
    /// positions are reproducible across runs.
    async fn find_all(&self) -> Result<Vec<TenantSession>>;

    /// Look up one tenant's session.
    async fn find_by_tenant(&self, tenant_id: &str) -> Result<Option<TenantSession>>;
}

pub struct PgSessionRepo {
    pool: PgPool,
}

impl PgSessionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepo for PgSessionRepo {
    async fn find_all(&self) -> Result<Vec<TenantSession>> {
        let rows = sqlx::query_as::<_, TenantSession>(
            r#"
            SELECT id, tenant_id, instance_id, phone_number, status,
                   created_at, updated_at
            FROM tenant_sessions
            ORDER BY tenant_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_by_tenant(&self, tenant_id: &str) -> Result<Option<TenantSession>> {
        let row = sqlx::query_as::<_, TenantSession>(
            r#"
            SELECT id, tenant_id, instance_id, phone_number, status,
                   created_at, updated_at
            FROM tenant_sessions
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
