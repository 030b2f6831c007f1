//! Follow-up engine — keyed one-shot timers over durable lead state.
//!
//! The timer table is process-local and disposable: every outstanding
//! reminder can be reconstructed from the lead store alone via
//! [`FollowupEngine::recover`]. Cancellation is passive — a fired timer
//! re-validates against the store before sending, so nothing ever has to
//! cancel a still-armed timer explicitly.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::channels::{Action, ChatApi};
use crate::followup::policy::ReminderPolicy;
use crate::leads::LeadPatch;
use crate::sheets::SheetMirror;
use crate::store::LeadStore;
use crate::templates;

/// Deterministic timer key for one reminder attempt.
///
/// Re-arming the same `(lead, attempt)` pair replaces the existing timer,
/// never duplicates it.
pub fn task_key(lead_id: i64, attempt: u32) -> String {
    format!("followup_{lead_id}_{attempt}")
}

struct Inner {
    policy: ReminderPolicy,
    store: Arc<dyn LeadStore>,
    chat: Arc<dyn ChatApi>,
    sheets: Arc<dyn SheetMirror>,
    /// Manager contact link attached to every reminder.
    manager_contact: String,
    /// Armed one-shot timers by task key.
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

/// Schedules and fires reminder attempts. Cheap to clone; all clones share
/// one timer table.
#[derive(Clone)]
pub struct FollowupEngine {
    inner: Arc<Inner>,
}

impl FollowupEngine {
    pub fn new(
        policy: ReminderPolicy,
        store: Arc<dyn LeadStore>,
        chat: Arc<dyn ChatApi>,
        sheets: Arc<dyn SheetMirror>,
        manager_contact: String,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                store,
                chat,
                sheets,
                manager_contact,
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn policy(&self) -> &ReminderPolicy {
        &self.inner.policy
    }

    /// Arm a one-shot timer for an attempt. Last write wins: an existing
    /// timer under the same key is aborted and replaced.
    ///
    /// Boxed rather than `async fn` to break the recursive future type
    /// created by the arm → spawn → fire_attempt → arm cycle.
    pub fn arm(
        &self,
        lead_id: i64,
        attempt: u32,
        fire_at: DateTime<Utc>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let key = task_key(lead_id, attempt);
            let delay = (fire_at - Utc::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);

            let engine = self.clone();
            let timer_key = key.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                engine.inner.timers.lock().await.remove(&timer_key);
                engine.fire_attempt(lead_id, attempt).await;
            });

            let mut timers = self.inner.timers.lock().await;
            if let Some(existing) = timers.insert(key.clone(), handle) {
                existing.abort();
                tracing::debug!(key, "Replaced armed timer");
            } else {
                tracing::debug!(key, fire_at = %fire_at, "Armed timer");
            }
        })
    }

    /// Fire one reminder attempt.
    ///
    /// Re-reads the store and re-validates before sending — an attempt for
    /// a re-engaged or exhausted lead is a normal no-op, not an error. A
    /// transport failure abandons the attempt: no counter increment, no
    /// re-arm (the operator escape hatch is a manual fire).
    pub async fn fire_attempt(&self, lead_id: i64, attempt: u32) {
        let inner = &self.inner;
        let lead = match inner.store.get(lead_id).await {
            Ok(Some(lead)) => lead,
            Ok(None) => {
                tracing::debug!(lead_id, attempt, "Reminder fired for unknown lead, dropping");
                return;
            }
            Err(e) => {
                tracing::error!(lead_id, attempt, "Reminder fired but lead read failed: {e}");
                return;
            }
        };

        if !inner.policy.should_send(&lead) {
            tracing::debug!(
                lead_id,
                attempt,
                attempts = lead.followup_attempts,
                "Reminder no longer valid, dropping"
            );
            return;
        }

        let pack = templates::pack(lead.language_or_default());
        let actions = [Action::url(
            pack.buttons.contact_manager,
            inner.manager_contact.clone(),
        )];
        if let Err(e) = inner.chat.send_text(lead.id, pack.followup, &actions).await {
            tracing::warn!(lead_id, attempt, "Follow-up send failed, attempt abandoned: {e}");
            return;
        }

        let attempts = lead.followup_attempts + 1;
        let patch = LeadPatch {
            followup_attempts: Some(attempts),
            ..Default::default()
        };
        if let Err(e) = inner.store.update_fields(lead_id, patch).await {
            // Sent but not recorded: stop the chain rather than risk
            // over-sending; the next recovery pass re-reads the store.
            tracing::error!(lead_id, attempt, "Failed to record follow-up attempt: {e}");
            return;
        }

        if let Err(e) = inner
            .sheets
            .upsert_row_by_key(
                &lead_id.to_string(),
                &[("followup_attempts", attempts.to_string())],
            )
            .await
        {
            tracing::warn!(lead_id, "Sheet mirror update skipped: {e}");
        }

        tracing::info!(lead_id, attempts, "Follow-up sent");

        if attempts < inner.policy.max_attempts {
            let fire_at = Utc::now() + inner.policy.interval;
            self.arm(lead_id, attempts + 1, fire_at).await;
        } else {
            tracing::info!(lead_id, "Follow-up attempts exhausted");
        }
    }

    /// Startup recovery pass: re-arm every outstanding reminder from
    /// durable state. Returns the number of timers armed.
    pub async fn recover(&self) -> usize {
        let leads = match self
            .inner
            .store
            .leads_awaiting_followup(self.inner.policy.max_attempts)
            .await
        {
            Ok(leads) => leads,
            Err(e) => {
                tracing::error!("Follow-up recovery scan failed: {e}");
                return 0;
            }
        };

        let now = Utc::now();
        let mut armed = 0;
        for lead in leads {
            let Some(due) = self.inner.policy.next_due_at(&lead, now) else {
                continue;
            };
            self.arm(lead.id, lead.followup_attempts + 1, due).await;
            armed += 1;
        }

        if armed > 0 {
            tracing::info!(armed, "Recovered outstanding follow-ups");
        }
        armed
    }

    /// Number of currently armed timers.
    pub async fn armed_count(&self) -> usize {
        self.inner.timers.lock().await.len()
    }

    /// Whether a timer is armed for `(lead, attempt)`.
    pub async fn is_armed(&self, lead_id: i64, attempt: u32) -> bool {
        self.inner
            .timers
            .lock()
            .await
            .contains_key(&task_key(lead_id, attempt))
    }
}
