//! Lifecycle orchestrator — wires inbound chat updates to the lead store,
//! the follow-up engine and the spreadsheet mirror.
//!
//! State transitions live here: language selection, subscription gating,
//! document delivery and the fallback path. Chat transport failures are
//! logged and contained; only store failures propagate.

use std::sync::Arc;
use std::sync::LazyLock;

use chrono::Utc;
use futures::StreamExt;
use regex::Regex;

use crate::channels::{Action, ChatApi, ChatUpdate, MembershipStatus, UpdateStream};
use crate::config::{Config, SharedDocumentUrl};
use crate::error::Result;
use crate::followup::FollowupEngine;
use crate::leads::{Lead, LeadPatch};
use crate::sheets::{LeadRow, SheetMirror};
use crate::store::LeadStore;
use crate::templates::{self, Language};

/// Matches the qualifying trigger word, including the Cyrillic and Thai
/// spellings and the mixed-script variants users actually type.
static TRIGGER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:проек(?:t|т)\w*|prоekt|project|โปรเจ\S*)\s*$")
        .expect("trigger regex is valid")
});

pub fn is_trigger_word(text: &str) -> bool {
    TRIGGER_RE.is_match(text)
}

pub struct Bot {
    store: Arc<dyn LeadStore>,
    chat: Arc<dyn ChatApi>,
    sheets: Arc<dyn SheetMirror>,
    engine: FollowupEngine,
    channel_link: String,
    manager_contact: String,
    admin_chat_id: Option<i64>,
    document_url: SharedDocumentUrl,
}

impl Bot {
    pub fn new(
        store: Arc<dyn LeadStore>,
        chat: Arc<dyn ChatApi>,
        sheets: Arc<dyn SheetMirror>,
        engine: FollowupEngine,
        config: &Config,
        document_url: SharedDocumentUrl,
    ) -> Self {
        Self {
            store,
            chat,
            sheets,
            engine,
            channel_link: config.channel_link.clone(),
            manager_contact: config.manager_contact.clone(),
            admin_chat_id: config.admin_chat_id,
            document_url,
        }
    }

    /// Consume the update stream until the transport closes it.
    pub async fn run(self: Arc<Self>, mut updates: UpdateStream) {
        while let Some(update) = updates.next().await {
            let user_id = update.user_id();
            if let Err(e) = self.handle_update(update).await {
                tracing::error!(user_id, "Update handling failed: {e}");
            }
        }
        tracing::warn!("Update stream closed");
    }

    pub async fn handle_update(&self, update: ChatUpdate) -> Result<()> {
        match update {
            ChatUpdate::Message {
                chat_id,
                user_id,
                username,
                first_name,
                text,
            } => {
                self.handle_message(chat_id, user_id, username, first_name, &text)
                    .await
            }
            ChatUpdate::Callback {
                callback_id,
                chat_id,
                user_id,
                username,
                first_name,
                data,
                message_id,
            } => {
                self.handle_callback(
                    &callback_id,
                    chat_id,
                    user_id,
                    username,
                    first_name,
                    &data,
                    message_id,
                )
                .await
            }
        }
    }

    async fn handle_message(
        &self,
        chat_id: i64,
        user_id: i64,
        username: Option<String>,
        first_name: Option<String>,
        text: &str,
    ) -> Result<()> {
        if let Some(rest) = text.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            match parts.next() {
                Some("start") => {
                    return self.handle_start(chat_id, user_id, username, first_name).await;
                }
                Some("update_document") => {
                    return self.handle_update_document(chat_id, parts.next()).await;
                }
                Some("force_followup") => {
                    return self.handle_force_followup(chat_id, parts.next()).await;
                }
                _ => {}
            }
        }

        let was_known = self.store.get(user_id).await?.is_some();
        self.store
            .upsert_identity(user_id, username.as_deref(), first_name.as_deref())
            .await?;
        if !was_known {
            self.mirror_new_lead(user_id).await?;
        }

        if is_trigger_word(text) {
            self.handle_document_request(chat_id, user_id).await
        } else {
            self.handle_fallback(chat_id, user_id, text).await
        }
    }

    /// `/start` — register the lead and offer the language chooser.
    async fn handle_start(
        &self,
        chat_id: i64,
        user_id: i64,
        username: Option<String>,
        first_name: Option<String>,
    ) -> Result<()> {
        let was_known = self.store.get(user_id).await?.is_some();
        self.store
            .upsert_identity(user_id, username.as_deref(), first_name.as_deref())
            .await?;
        if !was_known {
            self.mirror_new_lead(user_id).await?;
        }
        tracing::info!(user_id, "Lead started conversation");

        // A returning lead with a chosen language skips the chooser.
        if let Some(lang) = self.store.get(user_id).await?.and_then(|l| l.language) {
            let pack = templates::pack(lang);
            let actions = self.greeting_actions(pack);
            self.send(chat_id, pack.greeting, &actions).await;
            return Ok(());
        }

        self.send_language_chooser(chat_id).await;
        Ok(())
    }

    async fn send_language_chooser(&self, chat_id: i64) {
        let actions: Vec<Action> = Language::ALL
            .iter()
            .map(|lang| Action::callback(lang.native_name(), format!("lang:{lang}")))
            .collect();
        self.send(chat_id, templates::pack(Language::Ru).choose_lang, &actions)
            .await;
    }

    fn greeting_actions(&self, pack: &'static templates::TextPack) -> [Action; 3] {
        [
            Action::url(pack.buttons.subscribe, self.channel_link.clone()),
            Action::callback(pack.buttons.check_sub, "check_sub"),
            Action::callback(pack.buttons.change_lang, "change_lang"),
        ]
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_callback(
        &self,
        callback_id: &str,
        chat_id: i64,
        user_id: i64,
        username: Option<String>,
        first_name: Option<String>,
        data: &str,
        message_id: Option<i64>,
    ) -> Result<()> {
        self.store
            .upsert_identity(user_id, username.as_deref(), first_name.as_deref())
            .await?;

        if let Err(e) = self.chat.answer_callback(callback_id, None, false).await {
            tracing::warn!(user_id, "Callback ack failed: {e}");
        }

        if let Some(code) = data.strip_prefix("lang:") {
            return self
                .handle_language_selected(chat_id, user_id, code, message_id)
                .await;
        }
        match data {
            "check_sub" => self.handle_check_subscription(chat_id, user_id, message_id).await,
            "change_lang" => {
                self.send_language_chooser(chat_id).await;
                Ok(())
            }
            other => {
                tracing::debug!(user_id, data = other, "Unknown callback payload");
                Ok(())
            }
        }
    }

    /// Language button — persist the choice and greet with the subscribe
    /// keyboard.
    async fn handle_language_selected(
        &self,
        chat_id: i64,
        user_id: i64,
        code: &str,
        message_id: Option<i64>,
    ) -> Result<()> {
        let Ok(lang) = code.parse::<Language>() else {
            tracing::warn!(user_id, code, "Unknown language code in callback");
            return Ok(());
        };

        self.store
            .update_fields(
                user_id,
                LeadPatch {
                    language: Some(lang),
                    ..Default::default()
                },
            )
            .await?;
        self.mirror_fields(user_id, &[("language", lang.to_string())])
            .await;

        let pack = templates::pack(lang);
        let actions = self.greeting_actions(pack);
        self.respond(chat_id, message_id, pack.greeting, &actions).await;
        Ok(())
    }

    /// Check-subscription button — verify membership and either unlock the
    /// trigger word or prompt again.
    async fn handle_check_subscription(
        &self,
        chat_id: i64,
        user_id: i64,
        message_id: Option<i64>,
    ) -> Result<()> {
        let lang = self.lead_language(user_id).await?;
        let pack = templates::pack(lang);

        match self.chat.membership_status(user_id).await {
            MembershipStatus::Member => {
                self.store
                    .update_fields(
                        user_id,
                        LeadPatch {
                            subscribed: Some(true),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.mirror_fields(user_id, &[("subscribed", "true".into())])
                    .await;
                tracing::info!(user_id, "Lead confirmed channel subscription");
                self.respond(chat_id, message_id, pack.subscribed_ok, &[]).await;
            }
            MembershipStatus::NotMember => {
                let actions = [
                    Action::url(pack.buttons.subscribe, self.channel_link.clone()),
                    Action::callback(pack.buttons.check_sub, "check_sub"),
                ];
                self.respond(chat_id, message_id, pack.not_subscribed, &actions)
                    .await;
            }
            MembershipStatus::Unknown => {
                let actions = [Action::callback(pack.buttons.check_sub, "check_sub")];
                self.respond(chat_id, message_id, pack.check_failed, &actions)
                    .await;
            }
        }
        Ok(())
    }

    /// Trigger word — re-verify membership, deliver the document and start
    /// the reminder loop. A re-delivery resets the attempt counter.
    async fn handle_document_request(&self, chat_id: i64, user_id: i64) -> Result<()> {
        let lang = self.lead_language(user_id).await?;
        let pack = templates::pack(lang);

        match self.chat.membership_status(user_id).await {
            MembershipStatus::Member => {}
            MembershipStatus::NotMember => {
                let actions = [
                    Action::url(pack.buttons.subscribe, self.channel_link.clone()),
                    Action::callback(pack.buttons.check_sub, "check_sub"),
                ];
                self.send(chat_id, pack.not_subscribed, &actions).await;
                return Ok(());
            }
            MembershipStatus::Unknown => {
                let actions = [Action::callback(pack.buttons.check_sub, "check_sub")];
                self.send(chat_id, pack.check_failed, &actions).await;
                return Ok(());
            }
        }

        let url = self.document_url.get();
        if let Err(e) = self
            .chat
            .send_document_url(chat_id, &url, Some(pack.document_sent))
            .await
        {
            // Nothing delivered, so the reminder loop must not start.
            tracing::error!(user_id, "Document delivery failed: {e}");
            return Ok(());
        }

        let now = Utc::now();
        self.store
            .update_fields(
                user_id,
                LeadPatch {
                    subscribed: Some(true),
                    document_sent_at: Some(now),
                    followup_attempts: Some(0),
                    last_interaction_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;
        self.mirror_fields(
            user_id,
            &[
                ("subscribed", "true".into()),
                ("document_sent", now.to_rfc3339()),
                ("followup_attempts", "0".into()),
            ],
        )
        .await;
        tracing::info!(user_id, "Document delivered, reminder loop armed");

        let fire_at = self.engine.policy().first_due_at(now);
        self.engine.arm(user_id, 1, fire_at).await;
        Ok(())
    }

    /// Any other message — record it and point the lead at the manager.
    /// The interaction bump is what silences an active reminder loop.
    async fn handle_fallback(&self, chat_id: i64, user_id: i64, text: &str) -> Result<()> {
        let now = Utc::now();
        self.store
            .update_fields(
                user_id,
                LeadPatch {
                    last_message: Some(text.to_string()),
                    last_interaction_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;
        self.mirror_fields(
            user_id,
            &[
                ("last_message", text.to_string()),
                ("last_interaction", now.to_rfc3339()),
            ],
        )
        .await;

        let lang = self.lead_language(user_id).await?;
        let pack = templates::pack(lang);
        let actions = [Action::url(
            pack.buttons.contact_manager,
            self.manager_contact.clone(),
        )];
        self.send(chat_id, pack.fallback_question, &actions).await;
        Ok(())
    }

    /// `/update_document <url>` — swap the delivered document at runtime.
    async fn handle_update_document(&self, chat_id: i64, url: Option<&str>) -> Result<()> {
        if !self.is_admin(chat_id) {
            tracing::warn!(chat_id, "Ignored admin command from non-admin chat");
            return Ok(());
        }
        let Some(url) = url else {
            self.send(chat_id, "Usage: /update_document <url>", &[]).await;
            return Ok(());
        };
        self.document_url.set(url);
        tracing::info!(url, "Document URL updated");
        self.send(chat_id, "Document URL updated.", &[]).await;
        Ok(())
    }

    /// `/force_followup <lead_id>` — fire the next attempt immediately.
    async fn handle_force_followup(&self, chat_id: i64, arg: Option<&str>) -> Result<()> {
        if !self.is_admin(chat_id) {
            tracing::warn!(chat_id, "Ignored admin command from non-admin chat");
            return Ok(());
        }
        let Some(lead_id) = arg.and_then(|v| v.parse::<i64>().ok()) else {
            self.send(chat_id, "Usage: /force_followup <lead_id>", &[]).await;
            return Ok(());
        };
        let Some(lead) = self.store.get(lead_id).await? else {
            self.send(chat_id, "No such lead.", &[]).await;
            return Ok(());
        };

        self.engine
            .fire_attempt(lead_id, lead.followup_attempts + 1)
            .await;
        self.send(chat_id, "Follow-up fired.", &[]).await;
        Ok(())
    }

    fn is_admin(&self, chat_id: i64) -> bool {
        self.admin_chat_id == Some(chat_id)
    }

    async fn lead_language(&self, user_id: i64) -> Result<Language> {
        Ok(self
            .store
            .get(user_id)
            .await?
            .as_ref()
            .map(Lead::language_or_default)
            .unwrap_or(Language::Ru))
    }

    /// Send, logging transport failures instead of propagating them.
    async fn send(&self, chat_id: i64, text: &str, actions: &[Action]) {
        if let Err(e) = self.chat.send_text(chat_id, text, actions).await {
            tracing::warn!(chat_id, "Send failed: {e}");
        }
    }

    /// Edit the originating keyboard message when we have its id, falling
    /// back to a fresh message.
    async fn respond(&self, chat_id: i64, message_id: Option<i64>, text: &str, actions: &[Action]) {
        if let Some(message_id) = message_id
            && self
                .chat
                .edit_message_text(chat_id, message_id, text, actions)
                .await
                .is_ok()
        {
            return;
        }
        self.send(chat_id, text, actions).await;
    }

    /// First mirror write for a lead appends the full row.
    async fn mirror_new_lead(&self, user_id: i64) -> Result<()> {
        if let Some(lead) = self.store.get(user_id).await? {
            if let Err(e) = self.sheets.append_row(&LeadRow::from_lead(&lead)).await {
                tracing::warn!(user_id, "Sheet mirror append skipped: {e}");
            }
        }
        Ok(())
    }

    async fn mirror_fields(&self, user_id: i64, fields: &[(&str, String)]) {
        if let Err(e) = self
            .sheets
            .upsert_row_by_key(&user_id.to_string(), fields)
            .await
        {
            tracing::warn!(user_id, "Sheet mirror update skipped: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use chrono::Duration;

    use crate::config::ReminderConfig;
    use crate::error::ChannelError;
    use crate::followup::ReminderPolicy;
    use crate::leads::LeadPhase;
    use crate::sheets::NullMirror;
    use crate::store::LibSqlStore;

    struct FakeChat {
        texts: Mutex<Vec<(i64, String)>>,
        documents: Mutex<Vec<(i64, String)>>,
        membership: Mutex<MembershipStatus>,
        fail_documents: AtomicBool,
    }

    impl FakeChat {
        fn new() -> Self {
            Self {
                texts: Mutex::new(Vec::new()),
                documents: Mutex::new(Vec::new()),
                membership: Mutex::new(MembershipStatus::NotMember),
                fail_documents: AtomicBool::new(false),
            }
        }

        fn set_membership(&self, status: MembershipStatus) {
            *self.membership.lock().unwrap() = status;
        }

        fn last_text(&self) -> String {
            self.texts.lock().unwrap().last().unwrap().1.clone()
        }

        fn document_count(&self) -> usize {
            self.documents.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatApi for FakeChat {
        async fn membership_status(&self, _user_id: i64) -> MembershipStatus {
            *self.membership.lock().unwrap()
        }

        async fn send_text(
            &self,
            chat_id: i64,
            text: &str,
            _actions: &[Action],
        ) -> std::result::Result<(), ChannelError> {
            self.texts.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }

        async fn send_document_url(
            &self,
            chat_id: i64,
            url: &str,
            _caption: Option<&str>,
        ) -> std::result::Result<(), ChannelError> {
            if self.fail_documents.load(Ordering::Relaxed) {
                return Err(ChannelError::SendFailed {
                    name: "fake".into(),
                    reason: "injected".into(),
                });
            }
            self.documents.lock().unwrap().push((chat_id, url.to_string()));
            Ok(())
        }

        async fn answer_callback(
            &self,
            _callback_id: &str,
            _text: Option<&str>,
            _alert: bool,
        ) -> std::result::Result<(), ChannelError> {
            Ok(())
        }

        async fn edit_message_text(
            &self,
            chat_id: i64,
            _message_id: i64,
            text: &str,
            _actions: &[Action],
        ) -> std::result::Result<(), ChannelError> {
            self.texts.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        bot: Bot,
        chat: Arc<FakeChat>,
        store: Arc<LibSqlStore>,
        engine: FollowupEngine,
        document_url: SharedDocumentUrl,
    }

    async fn fixture() -> Fixture {
        let chat = Arc::new(FakeChat::new());
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let engine = FollowupEngine::new(
            ReminderPolicy::new(&ReminderConfig::default()),
            store.clone() as Arc<dyn LeadStore>,
            chat.clone() as Arc<dyn ChatApi>,
            Arc::new(NullMirror),
            "https://t.me/manager".into(),
        );
        let config = Config {
            bot_token: secrecy::SecretString::from("test-token"),
            channel_id: -100123,
            channel_link: "https://t.me/channel".into(),
            manager_contact: "https://t.me/manager".into(),
            admin_chat_id: Some(777),
            document_url: "https://example.com/doc.pdf".into(),
            document_filename: "doc.pdf".into(),
            reminder: ReminderConfig::default(),
            db_path: ":memory:".into(),
            sheets: None,
        };
        let document_url = SharedDocumentUrl::new(config.document_url.clone());
        let bot = Bot::new(
            store.clone() as Arc<dyn LeadStore>,
            chat.clone() as Arc<dyn ChatApi>,
            Arc::new(NullMirror),
            engine.clone(),
            &config,
            document_url.clone(),
        );
        Fixture {
            bot,
            chat,
            store,
            engine,
            document_url,
        }
    }

    fn message(user_id: i64, text: &str) -> ChatUpdate {
        ChatUpdate::Message {
            chat_id: user_id,
            user_id,
            username: Some("lead".into()),
            first_name: Some("Lead".into()),
            text: text.to_string(),
        }
    }

    fn callback(user_id: i64, data: &str) -> ChatUpdate {
        ChatUpdate::Callback {
            callback_id: "cb1".into(),
            chat_id: user_id,
            user_id,
            username: Some("lead".into()),
            first_name: Some("Lead".into()),
            data: data.to_string(),
            message_id: Some(10),
        }
    }

    #[test]
    fn trigger_word_variants() {
        for text in ["Проект", "проект", "  project  ", "PROJECT", "проекты", "โปรเจกต์"] {
            assert!(is_trigger_word(text), "{text}");
        }
        for text in ["send me the project please", "прое", "projects are nice", "hello"] {
            assert!(!is_trigger_word(text), "{text}");
        }
    }

    #[tokio::test]
    async fn start_registers_lead_and_offers_languages() {
        let f = fixture().await;
        f.bot.handle_update(message(1, "/start")).await.unwrap();

        let lead = f.store.get(1).await.unwrap().unwrap();
        assert_eq!(lead.username.as_deref(), Some("lead"));
        assert_eq!(
            f.chat.last_text(),
            templates::pack(Language::Ru).choose_lang
        );
    }

    #[tokio::test]
    async fn language_choice_persists_and_greets() {
        let f = fixture().await;
        f.bot.handle_update(message(1, "/start")).await.unwrap();
        f.bot.handle_update(callback(1, "lang:en")).await.unwrap();

        let lead = f.store.get(1).await.unwrap().unwrap();
        assert_eq!(lead.language, Some(Language::En));
        assert_eq!(f.chat.last_text(), templates::pack(Language::En).greeting);
    }

    #[tokio::test]
    async fn returning_start_skips_language_chooser() {
        let f = fixture().await;
        f.bot.handle_update(message(1, "/start")).await.unwrap();
        f.bot.handle_update(callback(1, "lang:th")).await.unwrap();

        f.bot.handle_update(message(1, "/start")).await.unwrap();
        assert_eq!(f.chat.last_text(), templates::pack(Language::Th).greeting);
    }

    #[tokio::test]
    async fn change_language_reopens_chooser() {
        let f = fixture().await;
        f.bot.handle_update(message(1, "/start")).await.unwrap();
        f.bot.handle_update(callback(1, "lang:en")).await.unwrap();

        f.bot.handle_update(callback(1, "change_lang")).await.unwrap();
        assert_eq!(
            f.chat.last_text(),
            templates::pack(Language::Ru).choose_lang
        );
    }

    #[tokio::test]
    async fn subscription_check_member_unlocks() {
        let f = fixture().await;
        f.bot.handle_update(message(1, "/start")).await.unwrap();
        f.chat.set_membership(MembershipStatus::Member);
        f.bot.handle_update(callback(1, "check_sub")).await.unwrap();

        let lead = f.store.get(1).await.unwrap().unwrap();
        assert!(lead.subscribed);
        assert_eq!(
            f.chat.last_text(),
            templates::pack(Language::Ru).subscribed_ok
        );
    }

    #[tokio::test]
    async fn subscription_check_non_member_prompts_again() {
        let f = fixture().await;
        f.bot.handle_update(message(1, "/start")).await.unwrap();
        f.bot.handle_update(callback(1, "check_sub")).await.unwrap();

        let lead = f.store.get(1).await.unwrap().unwrap();
        assert!(!lead.subscribed);
        assert_eq!(
            f.chat.last_text(),
            templates::pack(Language::Ru).not_subscribed
        );
    }

    #[tokio::test]
    async fn subscription_check_failure_degrades_to_retry() {
        let f = fixture().await;
        f.bot.handle_update(message(1, "/start")).await.unwrap();
        f.chat.set_membership(MembershipStatus::Unknown);
        f.bot.handle_update(callback(1, "check_sub")).await.unwrap();

        let lead = f.store.get(1).await.unwrap().unwrap();
        // A failed check never counts as confirmed membership.
        assert!(!lead.subscribed);
        assert_eq!(
            f.chat.last_text(),
            templates::pack(Language::Ru).check_failed
        );
    }

    #[tokio::test]
    async fn trigger_word_from_member_delivers_and_arms() {
        let f = fixture().await;
        f.chat.set_membership(MembershipStatus::Member);
        f.bot.handle_update(message(1, "Проект")).await.unwrap();

        assert_eq!(f.chat.document_count(), 1);
        let lead = f.store.get(1).await.unwrap().unwrap();
        assert!(lead.document_sent_at.is_some());
        assert_eq!(lead.followup_attempts, 0);
        assert!(f.engine.is_armed(1, 1).await);
    }

    #[tokio::test]
    async fn trigger_word_from_non_member_is_gated() {
        let f = fixture().await;
        f.bot.handle_update(message(1, "project")).await.unwrap();

        assert_eq!(f.chat.document_count(), 0);
        let lead = f.store.get(1).await.unwrap().unwrap();
        assert!(lead.document_sent_at.is_none());
        assert_eq!(f.engine.armed_count().await, 0);
    }

    #[tokio::test]
    async fn trigger_word_with_unknown_membership_degrades() {
        let f = fixture().await;
        f.chat.set_membership(MembershipStatus::Unknown);
        f.bot.handle_update(message(1, "project")).await.unwrap();

        assert_eq!(f.chat.document_count(), 0);
        assert_eq!(
            f.chat.last_text(),
            templates::pack(Language::Ru).check_failed
        );
    }

    #[tokio::test]
    async fn re_delivery_resets_attempt_counter() {
        let f = fixture().await;
        f.chat.set_membership(MembershipStatus::Member);
        f.bot.handle_update(message(1, "project")).await.unwrap();
        f.store
            .update_fields(
                1,
                LeadPatch {
                    followup_attempts: Some(2),
                    document_sent_at: Some(Utc::now() - Duration::days(5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.bot.handle_update(message(1, "project")).await.unwrap();

        let lead = f.store.get(1).await.unwrap().unwrap();
        assert_eq!(lead.followup_attempts, 0);
        assert!(lead.document_sent_at.unwrap() > Utc::now() - Duration::minutes(1));
        assert!(f.engine.is_armed(1, 1).await);
    }

    #[tokio::test]
    async fn failed_delivery_leaves_state_untouched() {
        let f = fixture().await;
        f.chat.set_membership(MembershipStatus::Member);
        f.chat.fail_documents.store(true, Ordering::Relaxed);
        f.bot.handle_update(message(1, "project")).await.unwrap();

        let lead = f.store.get(1).await.unwrap().unwrap();
        assert!(lead.document_sent_at.is_none());
        assert_eq!(f.engine.armed_count().await, 0);
    }

    #[tokio::test]
    async fn fallback_message_records_and_re_engages() {
        let f = fixture().await;
        f.chat.set_membership(MembershipStatus::Member);
        f.bot.handle_update(message(1, "project")).await.unwrap();

        f.bot
            .handle_update(message(1, "what about payment plans?"))
            .await
            .unwrap();

        let lead = f.store.get(1).await.unwrap().unwrap();
        assert_eq!(lead.last_message.as_deref(), Some("what about payment plans?"));
        assert_eq!(lead.phase(3), LeadPhase::ReEngaged);
        assert_eq!(
            f.chat.last_text(),
            templates::pack(Language::Ru).fallback_question
        );
    }

    #[tokio::test]
    async fn update_document_requires_admin() {
        let f = fixture().await;
        f.bot
            .handle_update(message(1, "/update_document https://example.com/new.pdf"))
            .await
            .unwrap();
        assert_eq!(f.document_url.get(), "https://example.com/doc.pdf");

        f.bot
            .handle_update(message(777, "/update_document https://example.com/new.pdf"))
            .await
            .unwrap();
        assert_eq!(f.document_url.get(), "https://example.com/new.pdf");
    }

    #[tokio::test]
    async fn force_followup_fires_immediately() {
        let f = fixture().await;
        f.store.upsert_identity(1, None, None).await.unwrap();
        let sent_at = Utc::now() - Duration::days(1);
        f.store
            .update_fields(
                1,
                LeadPatch {
                    document_sent_at: Some(sent_at),
                    last_interaction_at: Some(sent_at),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.bot
            .handle_update(message(777, "/force_followup 1"))
            .await
            .unwrap();

        let lead = f.store.get(1).await.unwrap().unwrap();
        assert_eq!(lead.followup_attempts, 1);
        let texts = f.chat.texts.lock().unwrap();
        assert!(texts.iter().any(|(chat_id, text)| {
            *chat_id == 1 && text == templates::pack(Language::Ru).followup
        }));
    }
}
