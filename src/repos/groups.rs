//! Group repository. Same lifecycle as contacts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use super::merge::{MergeEntity, PgEntityRepo};
use crate::error::Result;

/// Stored group row. Natural key: `(tenant_id, group_id)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GroupRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub session_phone: String,
    pub group_id: String,
    pub name: String,
    pub participants: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Group draft produced from one upstream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupDraft {
    pub tenant_id: String,
    pub session_phone: String,
    pub group_id: String,
    pub name: String,
    pub participants: i64,
}

/// Marker type instantiating [`PgEntityRepo`] for groups.
pub struct GroupEntity;

pub type GroupRepo = PgEntityRepo<GroupEntity>;

#[async_trait]
impl MergeEntity for GroupEntity {
    type Draft = GroupDraft;
    type Row = GroupRow;

    async fn upsert(
        conn: &mut PgConnection,
        draft: &GroupDraft,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO chat_groups (id, tenant_id, session_phone, group_id,
                                     name, participants, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ON CONFLICT (tenant_id, group_id) DO UPDATE SET
                session_phone = EXCLUDED.session_phone,
                name = EXCLUDED.name,
                participants = EXCLUDED.participants,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&draft.tenant_id)
        .bind(&draft.session_phone)
        .bind(&draft.group_id)
        .bind(&draft.name)
        .bind(draft.participants)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    async fn fetch(conn: &mut PgConnection, id: Uuid) -> Result<Option<GroupRow>> {
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT id, tenant_id, session_phone, group_id, name, participants,
                   created_at, updated_at
            FROM chat_groups
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row)
    }
}
