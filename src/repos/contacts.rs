//! Contact repository.
//!
//! Contacts are created or refreshed only through the sync bulk-merge; this
//! core never deletes them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use super::merge::{MergeEntity, PgEntityRepo};
use crate::error::Result;

/// Stored contact row. Natural key: `(tenant_id, phone_number)`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContactRow {
    pub id: Uuid,
    pub tenant_id: String,
    pub session_phone: String,
    pub phone_number: String,
    pub wid: Option<String>,
    pub name: String,
    pub profile_pic: Option<String>,
    pub is_business: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact draft produced from one upstream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactDraft {
    pub tenant_id: String,
    pub session_phone: String,
    pub phone_number: String,
    pub wid: Option<String>,
    pub name: String,
    pub profile_pic: Option<String>,
    pub is_business: bool,
}

/// Marker type instantiating [`PgEntityRepo`] for contacts.
pub struct ContactEntity;

pub type ContactRepo = PgEntityRepo<ContactEntity>;

#[async_trait]
impl MergeEntity for ContactEntity {
    type Draft = ContactDraft;
    type Row = ContactRow;

    async fn upsert(
        conn: &mut PgConnection,
        draft: &ContactDraft,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO contacts (id, tenant_id, session_phone, phone_number,
                                  wid, name, profile_pic, is_business,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ON CONFLICT (tenant_id, phone_number) DO UPDATE SET
                session_phone = EXCLUDED.session_phone,
                wid = EXCLUDED.wid,
                name = EXCLUDED.name,
                profile_pic = EXCLUDED.profile_pic,
                is_business = EXCLUDED.is_business,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&draft.tenant_id)
        .bind(&draft.session_phone)
        .bind(&draft.phone_number)
        .bind(&draft.wid)
        .bind(&draft.name)
        .bind(&draft.profile_pic)
        .bind(draft.is_business)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    async fn fetch(conn: &mut PgConnection, id: Uuid) -> Result<Option<ContactRow>> {
        let row = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT id, tenant_id, session_phone, phone_number, wid, name,
                   profile_pic, is_business, created_at, updated_at
            FROM contacts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row)
    }
}
