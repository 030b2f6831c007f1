//! `LeadStore` trait — single async interface for lead persistence.
//!
//! The store is the sole durable source of truth: the follow-up scheduler's
//! recovery pass reconstructs every outstanding reminder from it, so
//! everything here must survive a process restart.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::leads::{Lead, LeadPatch};

/// Backend-agnostic lead persistence.
///
/// All operations are atomic at single-lead granularity; there are no
/// cross-lead transactions.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Point lookup by id.
    async fn get(&self, id: i64) -> Result<Option<Lead>, DatabaseError>;

    /// Create the lead if absent, otherwise refresh its display fields.
    /// Always bumps `last_interaction_at` to now.
    async fn upsert_identity(
        &self,
        id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<(), DatabaseError>;

    /// Apply a partial update. Silent no-op when the lead does not exist.
    async fn update_fields(&self, id: i64, patch: LeadPatch) -> Result<(), DatabaseError>;

    /// Scan for leads with an outstanding reminder chain: a delivered
    /// document and attempts below the ceiling, ordered by id.
    ///
    /// Rows that fail to parse are skipped (logged), never fatal — one
    /// corrupt record must not abort a recovery pass.
    async fn leads_awaiting_followup(&self, max_attempts: u32)
    -> Result<Vec<Lead>, DatabaseError>;
}
