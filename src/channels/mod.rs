//! Chat transport abstraction and the Telegram implementation.

pub mod chat;
pub mod telegram;

pub use chat::{Action, ChatApi, ChatUpdate, MembershipStatus, UpdateStream};
pub use telegram::TelegramApi;
