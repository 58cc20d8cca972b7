//! Shared fakes for integration tests: recording merge repositories and an
//! in-memory sync status store.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use chatsync_core::config::UpstreamConfig;
use chatsync_core::error::Result;
use chatsync_core::repos::{BulkMerge, SyncStatusRepo, SyncStatusRow, SyncStatusUpdate};
use chatsync_core::upstream::UpstreamClient;
use chatsync_core::ChatsyncError;

/// Bulk-merge fake that records every batch and reports one affected row per
/// draft.
pub struct RecordingMerge<D> {
    batches: Mutex<Vec<Vec<D>>>,
}

impl<D: Clone> RecordingMerge<D> {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
        }
    }

    /// All drafts merged so far, in call order.
    pub fn merged(&self) -> Vec<D> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

impl<D: Clone> Default for RecordingMerge<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: Clone + Send + Sync + 'static> BulkMerge<D> for RecordingMerge<D> {
    async fn merge_many(&self, drafts: &[D]) -> Result<u64> {
        self.batches.lock().unwrap().push(drafts.to_vec());
        Ok(drafts.len() as u64)
    }
}

/// Sync status fake applying updates the way the Postgres upsert does:
/// `is_syncing`/`error` overwritten every call, `last_sync` and totals only
/// when present. Can be switched to fail writes to exercise the
/// infrastructure-error path.
pub struct FakeStatusRepo {
    row: Mutex<Option<SyncStatusRow>>,
    updates: Mutex<Vec<SyncStatusUpdate>>,
    fail_writes: AtomicBool,
}

impl FakeStatusRepo {
    pub fn new() -> Self {
        Self {
            row: Mutex::new(None),
            updates: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let repo = Self::new();
        repo.fail_writes.store(true, Ordering::Relaxed);
        repo
    }

    pub fn row(&self) -> Option<SyncStatusRow> {
        self.row.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<SyncStatusUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

impl Default for FakeStatusRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncStatusRepo for FakeStatusRepo {
    async fn upsert(
        &self,
        tenant_id: &str,
        session_phone: &str,
        update: SyncStatusUpdate,
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(ChatsyncError::Database(sqlx::Error::PoolClosed));
        }

        self.updates.lock().unwrap().push(update.clone());

        let now = Utc::now();
        let mut slot = self.row.lock().unwrap();
        let row = slot.get_or_insert_with(|| SyncStatusRow {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            session_phone: session_phone.to_string(),
            is_syncing: false,
            last_sync: None,
            total_contacts: 0,
            total_groups: 0,
            error: None,
            created_at: now,
            updated_at: now,
        });

        row.is_syncing = update.is_syncing;
        row.error = update.error;
        if let Some(last_sync) = update.last_sync {
            row.last_sync = Some(last_sync);
        }
        if let Some(total) = update.total_contacts {
            row.total_contacts = total;
        }
        if let Some(total) = update.total_groups {
            row.total_groups = total;
        }
        row.updated_at = now;

        Ok(())
    }

    async fn find(
        &self,
        _tenant_id: &str,
        _session_phone: &str,
    ) -> Result<Option<SyncStatusRow>> {
        Ok(self.row.lock().unwrap().clone())
    }
}

/// Upstream client pointed at a wiremock server.
pub fn upstream_for(uri: String) -> UpstreamClient {
    UpstreamClient::new(&UpstreamConfig {
        url: uri,
        api_key: "test-key".to_string(),
        timeout_secs: 5,
    })
    .unwrap()
}
