//! Reminder policy — pure decision logic, no I/O.

use chrono::{DateTime, Duration, Utc};

use crate::config::ReminderConfig;
use crate::leads::Lead;

/// Decides whether a reminder is due for a lead, and when.
#[derive(Debug, Clone)]
pub struct ReminderPolicy {
    /// Cadence between attempts.
    pub interval: Duration,
    /// Attempts allowed per document delivery.
    pub max_attempts: u32,
    /// Buffer applied when a recovered due time is already in the past.
    pub grace: Duration,
}

impl ReminderPolicy {
    pub fn new(config: &ReminderConfig) -> Self {
        Self {
            interval: Duration::days(config.interval_days as i64),
            max_attempts: config.max_attempts,
            grace: Duration::from_std(config.grace).unwrap_or(Duration::seconds(10)),
        }
    }

    /// True iff a reminder may be sent right now.
    ///
    /// Requires a delivered document, attempts below the ceiling, and no
    /// inbound activity since the delivery. Always re-run at fire time —
    /// arm-time validity is never trusted.
    pub fn should_send(&self, lead: &Lead) -> bool {
        let Some(sent_at) = lead.document_sent_at else {
            return false;
        };
        if lead.followup_attempts >= self.max_attempts {
            return false;
        }
        match lead.last_interaction_at {
            Some(interacted_at) => interacted_at <= sent_at,
            None => true,
        }
    }

    /// Due time for the first attempt, armed right after a delivery.
    pub fn first_due_at(&self, delivered_at: DateTime<Utc>) -> DateTime<Utc> {
        delivered_at + self.interval
    }

    /// Due time for the lead's next attempt, used by the recovery pass.
    ///
    /// Attempt `k = followup_attempts + 1` is due at
    /// `document_sent_at + interval * k`. A due time at or before `now`
    /// collapses to `now + grace` so a restart never fires a burst of
    /// overdue reminders at once. Returns `None` when the lead no longer
    /// qualifies.
    pub fn next_due_at(&self, lead: &Lead, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.should_send(lead) {
            return None;
        }
        let sent_at = lead.document_sent_at?;
        let k = (lead.followup_attempts + 1) as i32;
        let due = sent_at + self.interval * k;
        if due <= now {
            Some(now + self.grace)
        } else {
            Some(due)
        }
    }
}
