//! libSQL backend — async `LeadStore` implementation.
//!
//! Supports local file and in-memory databases. Timestamps are written as
//! RFC 3339 and parsed leniently on read.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params_from_iter};
use tracing::{info, warn};

use crate::error::DatabaseError;
use crate::leads::{Lead, LeadPatch};
use crate::store::migrations;
use crate::store::traits::LeadStore;
use crate::templates::Language;

/// Column order used by every SELECT in this module.
const LEAD_COLUMNS: &str = "id, username, first_name, subscribed, language, \
     last_message, last_interaction, document_sent_at, followup_attempts, manager_contacted";

/// libSQL lead store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string. `None` means malformed.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(ndt.and_utc());
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.and_utc());
    }
    None
}

/// Map a libsql row to a Lead. Column order matches `LEAD_COLUMNS`.
fn row_to_lead(row: &libsql::Row) -> Result<Lead, DatabaseError> {
    let id: i64 = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("Failed to read lead id: {e}")))?;

    let username: Option<String> = row.get(1).ok();
    let first_name: Option<String> = row.get(2).ok();
    let subscribed: i64 = row.get(3).unwrap_or(0);
    let language_str: Option<String> = row.get(4).ok();
    let last_message: Option<String> = row.get(5).ok();
    let last_interaction_str: Option<String> = row.get(6).ok();
    let document_sent_str: Option<String> = row.get(7).ok();
    let followup_attempts: i64 = row.get(8).unwrap_or(0);
    let manager_contacted: i64 = row.get(9).unwrap_or(0);

    let corrupt = |field: &str, value: &str| DatabaseError::Corrupt {
        lead_id: id,
        reason: format!("unparseable {field} '{value}'"),
    };

    let last_interaction_at = match last_interaction_str {
        Some(s) => Some(parse_datetime(&s).ok_or_else(|| corrupt("last_interaction", &s))?),
        None => None,
    };
    let document_sent_at = match document_sent_str {
        Some(s) => Some(parse_datetime(&s).ok_or_else(|| corrupt("document_sent_at", &s))?),
        None => None,
    };

    let language = match language_str {
        Some(s) => match s.parse::<Language>() {
            Ok(lang) => Some(lang),
            Err(()) => {
                warn!(lead_id = id, "Unknown stored language '{}', ignoring", s);
                None
            }
        },
        None => None,
    };

    Ok(Lead {
        id,
        username,
        first_name,
        subscribed: subscribed != 0,
        language,
        last_message,
        last_interaction_at,
        document_sent_at,
        followup_attempts: followup_attempts.max(0) as u32,
        manager_contacted: manager_contacted != 0,
    })
}

fn opt_text(value: Option<&str>) -> Value {
    match value {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

// ── LeadStore implementation ────────────────────────────────────────

#[async_trait]
impl LeadStore for LibSqlStore {
    async fn get(&self, id: i64) -> Result<Option<Lead>, DatabaseError> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1");
        let mut rows = self
            .conn()
            .query(&sql, libsql::params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to query lead {id}: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to read lead {id}: {e}")))?;

        match row {
            Some(row) => Ok(Some(row_to_lead(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_identity(
        &self,
        id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO leads (id, username, first_name, last_interaction, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                   username = COALESCE(excluded.username, username),
                   first_name = COALESCE(excluded.first_name, first_name),
                   last_interaction = excluded.last_interaction,
                   updated_at = excluded.updated_at",
                params_from_iter([
                    Value::Integer(id),
                    opt_text(username),
                    opt_text(first_name),
                    Value::Text(now),
                ]),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to upsert lead {id}: {e}")))?;
        Ok(())
    }

    async fn update_fields(&self, id: i64, patch: LeadPatch) -> Result<(), DatabaseError> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        let mut push = |col: &str, value: Value, sets: &mut Vec<String>, values: &mut Vec<Value>| {
            values.push(value);
            sets.push(format!("{col} = ?{}", values.len()));
        };

        if let Some(subscribed) = patch.subscribed {
            push("subscribed", Value::Integer(subscribed as i64), &mut sets, &mut values);
        }
        if let Some(language) = patch.language {
            push("language", Value::Text(language.as_str().into()), &mut sets, &mut values);
        }
        if let Some(ref msg) = patch.last_message {
            push("last_message", Value::Text(msg.clone()), &mut sets, &mut values);
        }
        if let Some(at) = patch.last_interaction_at {
            push("last_interaction", Value::Text(at.to_rfc3339()), &mut sets, &mut values);
        }
        if let Some(at) = patch.document_sent_at {
            push("document_sent_at", Value::Text(at.to_rfc3339()), &mut sets, &mut values);
        }
        if let Some(attempts) = patch.followup_attempts {
            push("followup_attempts", Value::Integer(attempts as i64), &mut sets, &mut values);
        }
        if let Some(contacted) = patch.manager_contacted {
            push("manager_contacted", Value::Integer(contacted as i64), &mut sets, &mut values);
        }

        push("updated_at", Value::Text(Utc::now().to_rfc3339()), &mut sets, &mut values);
        values.push(Value::Integer(id));

        // An UPDATE of a missing row affects nothing, which is the contract.
        let sql = format!(
            "UPDATE leads SET {} WHERE id = ?{}",
            sets.join(", "),
            values.len()
        );
        self.conn()
            .execute(&sql, params_from_iter(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to update lead {id}: {e}")))?;
        Ok(())
    }

    async fn leads_awaiting_followup(
        &self,
        max_attempts: u32,
    ) -> Result<Vec<Lead>, DatabaseError> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads
             WHERE document_sent_at IS NOT NULL AND followup_attempts < ?1
             ORDER BY id"
        );
        let mut rows = self
            .conn()
            .query(&sql, libsql::params![max_attempts as i64])
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to scan leads: {e}")))?;

        let mut leads = Vec::new();
        loop {
            let row = rows
                .next()
                .await
                .map_err(|e| DatabaseError::Query(format!("Failed to read lead row: {e}")))?;
            let Some(row) = row else { break };

            // A corrupt row is skipped, never fatal to the scan.
            match row_to_lead(&row) {
                Ok(lead) => leads.push(lead),
                Err(e) => warn!("Skipping unreadable lead row: {}", e),
            }
        }
        Ok(leads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn store() -> LibSqlStore {
        LibSqlStore::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn get_missing_lead_is_none() {
        let s = store().await;
        assert!(s.get(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_creates_and_bumps_interaction() {
        let s = store().await;
        s.upsert_identity(1, Some("alice"), Some("Alice")).await.unwrap();

        let lead = s.get(1).await.unwrap().unwrap();
        assert_eq!(lead.username.as_deref(), Some("alice"));
        assert_eq!(lead.first_name.as_deref(), Some("Alice"));
        assert!(!lead.subscribed);
        assert!(lead.last_interaction_at.is_some());
        assert_eq!(lead.followup_attempts, 0);
    }

    #[tokio::test]
    async fn upsert_keeps_existing_name_when_absent() {
        let s = store().await;
        s.upsert_identity(1, Some("alice"), Some("Alice")).await.unwrap();
        let first = s.get(1).await.unwrap().unwrap();

        s.upsert_identity(1, None, None).await.unwrap();
        let second = s.get(1).await.unwrap().unwrap();

        assert_eq!(second.username.as_deref(), Some("alice"));
        assert_eq!(second.first_name.as_deref(), Some("Alice"));
        assert!(second.last_interaction_at >= first.last_interaction_at);
    }

    #[tokio::test]
    async fn update_fields_round_trip() {
        let s = store().await;
        s.upsert_identity(2, Some("bob"), None).await.unwrap();

        let sent_at = Utc::now();
        s.update_fields(
            2,
            LeadPatch {
                subscribed: Some(true),
                language: Some(Language::En),
                last_message: Some("project".into()),
                document_sent_at: Some(sent_at),
                followup_attempts: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let lead = s.get(2).await.unwrap().unwrap();
        assert!(lead.subscribed);
        assert_eq!(lead.language, Some(Language::En));
        assert_eq!(lead.last_message.as_deref(), Some("project"));
        assert_eq!(lead.followup_attempts, 1);
        // RFC 3339 round-trip is exact.
        assert_eq!(lead.document_sent_at.unwrap(), sent_at);
    }

    #[tokio::test]
    async fn update_fields_missing_lead_is_silent() {
        let s = store().await;
        s.update_fields(
            999,
            LeadPatch {
                subscribed: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(s.get(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_patch_is_noop() {
        let s = store().await;
        s.update_fields(1, LeadPatch::default()).await.unwrap();
    }

    #[tokio::test]
    async fn followup_scan_filters_and_orders() {
        let s = store().await;
        let now = Utc::now();

        for id in [3, 1, 2, 4] {
            s.upsert_identity(id, None, None).await.unwrap();
        }
        // 1: awaiting, 2: exhausted, 3: awaiting, 4: no document.
        for (id, attempts) in [(1, 0), (2, 3), (3, 2)] {
            s.update_fields(
                id,
                LeadPatch {
                    document_sent_at: Some(now - Duration::days(1)),
                    followup_attempts: Some(attempts),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let ids: Vec<i64> = s
            .leads_awaiting_followup(3)
            .await
            .unwrap()
            .iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn corrupt_timestamp_skipped_by_scan() {
        let s = store().await;
        s.upsert_identity(1, None, None).await.unwrap();
        s.upsert_identity(2, None, None).await.unwrap();
        s.update_fields(
            2,
            LeadPatch {
                document_sent_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // Sabotage lead 1 directly.
        s.conn()
            .execute(
                "UPDATE leads SET document_sent_at = 'not-a-date' WHERE id = 1",
                (),
            )
            .await
            .unwrap();

        let leads = s.leads_awaiting_followup(3).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].id, 2);

        // Point lookup of the corrupt row surfaces the error.
        assert!(matches!(
            s.get(1).await,
            Err(DatabaseError::Corrupt { lead_id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn unknown_language_ignored() {
        let s = store().await;
        s.upsert_identity(5, None, None).await.unwrap();
        s.conn()
            .execute("UPDATE leads SET language = 'xx' WHERE id = 5", ())
            .await
            .unwrap();

        let lead = s.get(5).await.unwrap().unwrap();
        assert!(lead.language.is_none());
    }

    #[test]
    fn datetime_parsing_formats() {
        assert!(parse_datetime("2026-01-01T10:00:00+00:00").is_some());
        assert!(parse_datetime("2026-01-01 10:00:00").is_some());
        assert!(parse_datetime("2026-01-01 10:00:00.123").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }
}
