//! The per-tenant sync state machine.
//!
//! One invocation walks `status:syncing → connection-check → contacts →
//! groups → status:terminal`. Business failures (instance offline, an
//! upstream call erroring, a merge erroring) are folded into the terminal
//! status write and the returned [`SyncReport`]; they do not surface on the
//! `Result` channel, so the job queue never retries them. The `Result` error
//! channel is reserved for status writes themselves failing — those are
//! infrastructure failures the queue should retry.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::repos::{BulkMerge, ContactDraft, GroupDraft, SyncStatusRepo, SyncStatusUpdate};
use crate::upstream::{UpstreamClient, UpstreamContact, UpstreamGroup};

/// Business error recorded when the tenant's instance is not connected.
pub const NOT_CONNECTED_ERROR: &str = "WhatsApp instance not connected";

/// Outcome of one sync run. Counts are affected rows as reported by the
/// repositories; `error` is set for business failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub tenant_id: String,
    pub contacts_count: u64,
    pub groups_count: u64,
    pub duration_secs: u64,
    pub error: Option<String>,
}

/// Drives one tenant's sync against the upstream API and the repositories.
pub struct SyncOrchestrator {
    contacts: Arc<dyn BulkMerge<ContactDraft>>,
    groups: Arc<dyn BulkMerge<GroupDraft>>,
    status: Arc<dyn SyncStatusRepo>,
    upstream: UpstreamClient,
}

impl SyncOrchestrator {
    pub fn new(
        contacts: Arc<dyn BulkMerge<ContactDraft>>,
        groups: Arc<dyn BulkMerge<GroupDraft>>,
        status: Arc<dyn SyncStatusRepo>,
        upstream: UpstreamClient,
    ) -> Self {
        Self {
            contacts,
            groups,
            status,
            upstream,
        }
    }

    /// Run a full sync for one tenant.
    ///
    /// Returns `Err` only when a status write fails; every other failure is
    /// reported inside the `Ok` report.
    pub async fn sync_tenant(&self, tenant_id: &str, session_phone: &str) -> Result<SyncReport> {
        let started = Instant::now();
        info!(tenant = %tenant_id, "starting sync");

        self.status
            .upsert(tenant_id, session_phone, SyncStatusUpdate::started())
            .await?;

        match self.run_phases(tenant_id, session_phone).await {
            Ok((contacts_count, groups_count)) => {
                self.status
                    .upsert(
                        tenant_id,
                        session_phone,
                        SyncStatusUpdate::succeeded(
                            Utc::now(),
                            contacts_count as i64,
                            groups_count as i64,
                        ),
                    )
                    .await?;

                let duration_secs = elapsed_whole_secs(started);
                info!(
                    tenant = %tenant_id,
                    contacts = contacts_count,
                    groups = groups_count,
                    duration_secs,
                    "sync completed"
                );

                Ok(SyncReport {
                    tenant_id: tenant_id.to_string(),
                    contacts_count,
                    groups_count,
                    duration_secs,
                    error: None,
                })
            }
            Err(reason) => {
                error!(tenant = %tenant_id, error = %reason, "sync failed");
                self.status
                    .upsert(tenant_id, session_phone, SyncStatusUpdate::failed(reason.clone()))
                    .await?;

                Ok(SyncReport {
                    tenant_id: tenant_id.to_string(),
                    contacts_count: 0,
                    groups_count: 0,
                    duration_secs: elapsed_whole_secs(started),
                    error: Some(reason),
                })
            }
        }
    }

    /// Connection check plus both sync phases. Any failure aborts the
    /// remaining phases and becomes the run's business error.
    async fn run_phases(
        &self,
        tenant_id: &str,
        session_phone: &str,
    ) -> std::result::Result<(u64, u64), String> {
        if !self.upstream.is_connected(tenant_id).await {
            return Err(NOT_CONNECTED_ERROR.to_string());
        }

        let contacts_count = self
            .sync_contacts(tenant_id, session_phone)
            .await
            .map_err(|e| e.to_string())?;
        info!(tenant = %tenant_id, contacts = contacts_count, "contacts merged");

        let groups_count = self
            .sync_groups(tenant_id, session_phone)
            .await
            .map_err(|e| e.to_string())?;
        info!(tenant = %tenant_id, groups = groups_count, "groups merged");

        Ok((contacts_count, groups_count))
    }

    async fn sync_contacts(&self, tenant_id: &str, session_phone: &str) -> Result<u64> {
        let raw = self.upstream.find_contacts(tenant_id).await?;
        if raw.is_empty() {
            warn!(tenant = %tenant_id, "no contacts found upstream");
            return Ok(0);
        }

        let drafts = contact_drafts(tenant_id, session_phone, &raw);
        self.contacts.merge_many(&drafts).await
    }

    async fn sync_groups(&self, tenant_id: &str, session_phone: &str) -> Result<u64> {
        let raw = self.upstream.fetch_all_groups(tenant_id).await?;
        if raw.is_empty() {
            warn!(tenant = %tenant_id, "no groups found upstream");
            return Ok(0);
        }

        let drafts = group_drafts(tenant_id, session_phone, &raw);
        self.groups.merge_many(&drafts).await
    }
}

fn elapsed_whole_secs(started: Instant) -> u64 {
    started.elapsed().as_secs_f64().round() as u64
}

/// Map upstream contact entries to drafts.
///
/// Drops entries that represent groups or lack a routable identifier. The
/// phone number is the `remoteJid` up to the `@`; the display name falls back
/// from `name` to `pushName` to empty.
pub fn contact_drafts(
    tenant_id: &str,
    session_phone: &str,
    raw: &[UpstreamContact],
) -> Vec<ContactDraft> {
    raw.iter()
        .filter(|c| !c.is_group && c.remote_jid.as_deref().is_some_and(|jid| !jid.is_empty()))
        .map(|c| {
            let jid = c.remote_jid.as_deref().unwrap_or_default();
            let name = c
                .name
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(c.push_name.as_deref().filter(|s| !s.is_empty()))
                .unwrap_or_default();

            ContactDraft {
                tenant_id: tenant_id.to_string(),
                session_phone: session_phone.to_string(),
                phone_number: jid.split('@').next().unwrap_or_default().to_string(),
                wid: c.id.clone(),
                name: name.to_string(),
                profile_pic: c.profile_pic_url.clone().filter(|s| !s.is_empty()),
                is_business: c.is_business,
            }
        })
        .collect()
}

/// Map upstream group entries to drafts, keeping only ids that mark a genuine
/// group (`…@g.us`).
pub fn group_drafts(
    tenant_id: &str,
    session_phone: &str,
    raw: &[UpstreamGroup],
) -> Vec<GroupDraft> {
    raw.iter()
        .filter_map(|g| {
            let group_id = g.id.as_deref().filter(|id| id.ends_with("@g.us"))?;
            let name = g
                .subject
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or("Unknown Group");

            Some(GroupDraft {
                tenant_id: tenant_id.to_string(),
                session_phone: session_phone.to_string(),
                group_id: group_id.to_string(),
                name: name.to_string(),
                participants: g.size.unwrap_or(0),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_contact(jid: Option<&str>, is_group: bool) -> UpstreamContact {
        UpstreamContact {
            remote_jid: jid.map(str::to_string),
            id: Some("wid:1".to_string()),
            name: None,
            push_name: None,
            profile_pic_url: None,
            is_business: false,
            is_group,
        }
    }

    #[test]
    fn contact_mapping_drops_groups_and_missing_jids() {
        let raw = vec![
            raw_contact(Some("5511999@s.whatsapp.net"), false),
            raw_contact(Some("group@g.us"), true),
            raw_contact(None, false),
            raw_contact(Some(""), false),
        ];

        let drafts = contact_drafts("t1", "555", &raw);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].phone_number, "5511999");
        assert!(drafts.len() <= raw.len());
    }

    #[test]
    fn contact_name_falls_back_to_push_name_then_empty() {
        let mut c = raw_contact(Some("1@s.whatsapp.net"), false);
        c.name = Some(String::new());
        c.push_name = Some("Push".to_string());
        let drafts = contact_drafts("t1", "", &[c.clone()]);
        assert_eq!(drafts[0].name, "Push");

        c.push_name = None;
        let drafts = contact_drafts("t1", "", &[c]);
        assert_eq!(drafts[0].name, "");
    }

    #[test]
    fn group_mapping_filters_on_group_suffix_and_defaults() {
        let raw = vec![
            UpstreamGroup {
                id: Some("123@g.us".to_string()),
                subject: None,
                size: None,
            },
            UpstreamGroup {
                id: Some("456@s.whatsapp.net".to_string()),
                subject: Some("Not a group".to_string()),
                size: Some(3),
            },
            UpstreamGroup {
                id: None,
                subject: None,
                size: None,
            },
        ];

        let drafts = group_drafts("t1", "555", &raw);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].group_id, "123@g.us");
        assert_eq!(drafts[0].name, "Unknown Group");
        assert_eq!(drafts[0].participants, 0);
    }
}
