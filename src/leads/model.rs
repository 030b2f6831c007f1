//! Lead data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::templates::Language;

/// Conceptual lifecycle phase, derived from fields — never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadPhase {
    /// No document delivered yet.
    New,
    /// Document delivered, reminder loop active.
    DocumentSent,
    /// All reminder attempts used up.
    Exhausted,
    /// User wrote back after the delivery; the loop is dormant until a
    /// fresh delivery restarts it.
    ReEngaged,
}

/// One durable record per end-user identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Telegram chat/user id — primary key.
    pub id: i64,
    /// Telegram username, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Display first name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Set once channel membership is confirmed; never unset.
    pub subscribed: bool,
    /// Selected display language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// Audit snapshot of the most recent inbound text. Observational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Most recent inbound event of any kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_interaction_at: Option<DateTime<Utc>>,
    /// When the qualifying document was last delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_sent_at: Option<DateTime<Utc>>,
    /// Reminders sent since the last document delivery.
    pub followup_attempts: u32,
    /// Operator-settable flag; the automatic lifecycle never touches it.
    pub manager_contacted: bool,
}

impl Lead {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            username: None,
            first_name: None,
            subscribed: false,
            language: None,
            last_message: None,
            last_interaction_at: None,
            document_sent_at: None,
            followup_attempts: 0,
            manager_contacted: false,
        }
    }

    /// Language to render texts in, defaulting to Russian.
    pub fn language_or_default(&self) -> Language {
        self.language.unwrap_or(Language::Ru)
    }

    /// Derive the lifecycle phase for a given attempts ceiling.
    pub fn phase(&self, max_attempts: u32) -> LeadPhase {
        let Some(sent_at) = self.document_sent_at else {
            return LeadPhase::New;
        };
        if let Some(interacted_at) = self.last_interaction_at
            && interacted_at > sent_at
        {
            return LeadPhase::ReEngaged;
        }
        if self.followup_attempts >= max_attempts {
            return LeadPhase::Exhausted;
        }
        LeadPhase::DocumentSent
    }
}

/// Partial update applied to an existing lead. `None` fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct LeadPatch {
    pub subscribed: Option<bool>,
    pub language: Option<Language>,
    pub last_message: Option<String>,
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub document_sent_at: Option<DateTime<Utc>>,
    pub followup_attempts: Option<u32>,
    pub manager_contacted: Option<bool>,
}

impl LeadPatch {
    pub fn is_empty(&self) -> bool {
        self.subscribed.is_none()
            && self.language.is_none()
            && self.last_message.is_none()
            && self.last_interaction_at.is_none()
            && self.document_sent_at.is_none()
            && self.followup_attempts.is_none()
            && self.manager_contacted.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn phase_new_without_document() {
        let lead = Lead::new(1);
        assert_eq!(lead.phase(3), LeadPhase::New);
    }

    #[test]
    fn phase_document_sent() {
        let mut lead = Lead::new(1);
        lead.document_sent_at = Some(Utc::now());
        assert_eq!(lead.phase(3), LeadPhase::DocumentSent);
    }

    #[test]
    fn phase_exhausted_at_ceiling() {
        let mut lead = Lead::new(1);
        lead.document_sent_at = Some(Utc::now());
        lead.followup_attempts = 3;
        assert_eq!(lead.phase(3), LeadPhase::Exhausted);
    }

    #[test]
    fn phase_re_engaged_wins_over_exhausted() {
        let now = Utc::now();
        let mut lead = Lead::new(1);
        lead.document_sent_at = Some(now - Duration::hours(2));
        lead.last_interaction_at = Some(now);
        lead.followup_attempts = 3;
        assert_eq!(lead.phase(3), LeadPhase::ReEngaged);
    }

    #[test]
    fn interaction_before_delivery_is_not_re_engagement() {
        let now = Utc::now();
        let mut lead = Lead::new(1);
        lead.last_interaction_at = Some(now - Duration::hours(2));
        lead.document_sent_at = Some(now);
        assert_eq!(lead.phase(3), LeadPhase::DocumentSent);
    }

    #[test]
    fn default_language_is_russian() {
        let lead = Lead::new(1);
        assert_eq!(lead.language_or_default(), Language::Ru);
    }

    #[test]
    fn empty_patch_detection() {
        assert!(LeadPatch::default().is_empty());
        let patch = LeadPatch {
            subscribed: Some(true),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
