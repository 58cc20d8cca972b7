//! Per-tenant sync orchestration.

mod orchestrator;

pub use orchestrator::{
    contact_drafts, group_drafts, SyncOrchestrator, SyncReport, NOT_CONNECTED_ERROR,
};
