//! Telegram channel — long-polls the Bot API for updates.
//!
//! Native Rust Telegram Bot API implementation behind the `ChatApi` trait:
//! JSON calls via reqwest, `getUpdates` long-polling pumped into an mpsc
//! stream of `ChatUpdate`s.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::chat::{Action, ChatApi, ChatUpdate, MembershipStatus, UpdateStream};
use crate::error::ChannelError;

/// Request timeout. Long-polling uses a 30s server-side wait, so the client
/// bound sits comfortably above it.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(50);

/// Telegram chat transport.
pub struct TelegramApi {
    bot_token: SecretString,
    /// Numeric id of the channel users must be subscribed to.
    channel_id: i64,
    client: reqwest::Client,
}

impl TelegramApi {
    pub fn new(bot_token: SecretString, channel_id: i64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            bot_token,
            channel_id,
            client,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// POST a JSON body to a Bot API method and return the `result` field.
    async fn call(&self, method: &str, body: Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method}: {e}"),
            })?;

        let status = resp.status();
        let data: Value = resp.json().await.map_err(|e| ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("{method}: invalid response body: {e}"),
        })?;

        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} failed ({status}): {description}"),
            });
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Bot username, used as a startup health check.
    pub async fn get_me(&self) -> Result<String, ChannelError> {
        let result = self.call("getMe", json!({})).await.map_err(|e| {
            ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            }
        })?;
        Ok(result
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    /// Start the long-polling loop and return the inbound update stream.
    pub fn start_polling(&self) -> UpdateStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.client.clone();
        let url = self.api_url("getUpdates");

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for updates...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                if let Some(results) = data.get("result").and_then(Value::as_array) {
                    for update in results {
                        if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                            offset = uid + 1;
                        }

                        let Some(parsed) = parse_update(update) else {
                            continue;
                        };

                        if tx.send(parsed).is_err() {
                            tracing::info!("Telegram listener channel closed");
                            return;
                        }
                    }
                }
            }
        });

        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }
}

#[async_trait]
impl ChatApi for TelegramApi {
    async fn membership_status(&self, user_id: i64) -> MembershipStatus {
        let body = json!({ "chat_id": self.channel_id, "user_id": user_id });
        match self.call("getChatMember", body).await {
            Ok(result) => {
                let status = result.get("status").and_then(Value::as_str).unwrap_or("");
                map_member_status(status)
            }
            Err(e) => {
                tracing::warn!(user_id, "getChatMember failed: {e}");
                MembershipStatus::Unknown
            }
        }
    }

    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        actions: &[Action],
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if !actions.is_empty() {
            body["reply_markup"] = keyboard_json(actions);
        }
        self.call("sendMessage", body).await?;
        Ok(())
    }

    async fn send_document_url(
        &self,
        chat_id: i64,
        url: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "chat_id": chat_id, "document": url });
        if let Some(cap) = caption {
            body["caption"] = Value::String(cap.to_string());
        }
        self.call("sendDocument", body).await?;
        tracing::info!(chat_id, "Telegram document (URL) sent");
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "callback_query_id": callback_id, "show_alert": alert });
        if let Some(t) = text {
            body["text"] = Value::String(t.to_string());
        }
        self.call("answerCallbackQuery", body).await?;
        Ok(())
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        actions: &[Action],
    ) -> Result<(), ChannelError> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text
        });
        if !actions.is_empty() {
            body["reply_markup"] = keyboard_json(actions);
        }
        self.call("editMessageText", body).await?;
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a `getChatMember` status string to a membership decision.
/// Creators and administrators count as members.
fn map_member_status(status: &str) -> MembershipStatus {
    match status {
        "creator" | "administrator" | "member" => MembershipStatus::Member,
        "left" | "kicked" | "restricted" => MembershipStatus::NotMember,
        _ => MembershipStatus::Unknown,
    }
}

/// Build an inline keyboard, one button per row.
fn keyboard_json(actions: &[Action]) -> Value {
    let rows: Vec<Value> = actions
        .iter()
        .map(|action| match action {
            Action::Url { label, url } => json!([{ "text": label, "url": url }]),
            Action::Callback { label, data } => {
                json!([{ "text": label, "callback_data": data }])
            }
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Parse one raw `getUpdates` entry into a `ChatUpdate`.
fn parse_update(update: &Value) -> Option<ChatUpdate> {
    if let Some(message) = update.get("message") {
        let text = message.get("text").and_then(Value::as_str)?;
        let from = message.get("from")?;
        let user_id = from.get("id").and_then(Value::as_i64)?;
        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)
            .unwrap_or(user_id);

        return Some(ChatUpdate::Message {
            chat_id,
            user_id,
            username: from
                .get("username")
                .and_then(Value::as_str)
                .map(String::from),
            first_name: from
                .get("first_name")
                .and_then(Value::as_str)
                .map(String::from),
            text: text.to_string(),
        });
    }

    if let Some(callback) = update.get("callback_query") {
        let callback_id = callback.get("id").and_then(Value::as_str)?;
        let data = callback.get("data").and_then(Value::as_str)?;
        let from = callback.get("from")?;
        let user_id = from.get("id").and_then(Value::as_i64)?;
        let message = callback.get("message");
        let chat_id = message
            .and_then(|m| m.get("chat"))
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)
            .unwrap_or(user_id);

        return Some(ChatUpdate::Callback {
            callback_id: callback_id.to_string(),
            chat_id,
            user_id,
            username: from
                .get("username")
                .and_then(Value::as_str)
                .map(String::from),
            first_name: from
                .get("first_name")
                .and_then(Value::as_str)
                .map(String::from),
            data: data.to_string(),
            message_id: message.and_then(|m| m.get("message_id")).and_then(Value::as_i64),
        });
    }

    None
}

// ── Tests ───────────────────────────────────────────────────────────
