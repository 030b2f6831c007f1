//! Chat capability surface the lifecycle core consumes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// Result of a channel-membership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Member,
    NotMember,
    /// The check itself failed; the caller must degrade gracefully and
    /// never treat this as confirmed membership.
    Unknown,
}

/// An inline action button attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Opens a link.
    Url { label: String, url: String },
    /// Sends a callback payload back to the bot.
    Callback { label: String, data: String },
}

impl Action {
    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Action::Url {
            label: label.into(),
            url: url.into(),
        }
    }

    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Action::Callback {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// One inbound event from the chat transport.
#[derive(Debug, Clone)]
pub enum ChatUpdate {
    /// A plain text message.
    Message {
        chat_id: i64,
        user_id: i64,
        username: Option<String>,
        first_name: Option<String>,
        text: String,
    },
    /// A button press on an earlier inline keyboard.
    Callback {
        callback_id: String,
        chat_id: i64,
        user_id: i64,
        username: Option<String>,
        first_name: Option<String>,
        data: String,
        message_id: Option<i64>,
    },
}

impl ChatUpdate {
    pub fn user_id(&self) -> i64 {
        match self {
            ChatUpdate::Message { user_id, .. } | ChatUpdate::Callback { user_id, .. } => *user_id,
        }
    }
}

/// Stream of inbound updates.
pub type UpdateStream = Pin<Box<dyn Stream<Item = ChatUpdate> + Send>>;

/// Chat transport capability.
///
/// Send failures are transport errors the lifecycle catches locally; they
/// never crash the process.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Check whether a user is a member of the gated channel.
    ///
    /// A failed check maps to [`MembershipStatus::Unknown`], not an error.
    async fn membership_status(&self, user_id: i64) -> MembershipStatus;

    /// Send a text message, optionally with inline action buttons.
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        actions: &[Action],
    ) -> Result<(), ChannelError>;

    /// Send a document by URL (the transport downloads it).
    async fn send_document_url(
        &self,
        chat_id: i64,
        url: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;

    /// Acknowledge a callback button press, optionally with an alert popup.
    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
        alert: bool,
    ) -> Result<(), ChannelError>;

    /// Replace the text (and keyboard) of an earlier message.
    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        actions: &[Action],
    ) -> Result<(), ChannelError>;
}
