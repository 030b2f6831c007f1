//! Configuration types.
//!
//! Everything is read once from the environment at startup; the only
//! runtime-mutable value is the document URL, which lives behind
//! [`SharedDocumentUrl`] so the admin command has a single synchronized
//! mutation path.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Reminder cadence settings.
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// Days between follow-up attempts.
    pub interval_days: u32,
    /// Maximum follow-up attempts per document delivery.
    pub max_attempts: u32,
    /// Buffer applied to overdue reminders recovered at startup.
    pub grace: Duration,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            interval_days: 2,
            max_attempts: 3,
            grace: Duration::from_secs(10),
        }
    }
}

/// Google Sheets mirror settings. Absent when the mirror is disabled.
#[derive(Debug, Clone)]
pub struct SheetConfig {
    /// Spreadsheet ID (from the sheet URL).
    pub sheet_id: String,
    /// Worksheet (tab) name.
    pub worksheet: String,
    /// OAuth bearer token with the spreadsheets scope.
    pub token: SecretString,
}

/// Bot configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token.
    pub bot_token: SecretString,
    /// Numeric chat id of the channel users must subscribe to.
    pub channel_id: i64,
    /// Public link to the channel (for the subscribe button).
    pub channel_link: String,
    /// Manager contact link (for the contact-manager button).
    pub manager_contact: String,
    /// Chat id allowed to run admin commands.
    pub admin_chat_id: Option<i64>,
    /// URL of the qualifying document (initial value; mutable at runtime).
    pub document_url: String,
    /// Filename shown to the user when the document is delivered.
    pub document_filename: String,
    /// Reminder cadence.
    pub reminder: ReminderConfig,
    /// Path to the local database file.
    pub db_path: String,
    /// Optional spreadsheet mirror.
    pub sheets: Option<SheetConfig>,
}

impl Config {
    /// Build the configuration from the environment.
    ///
    /// `BOT_TOKEN`, `CHANNEL_ID` and `DOCUMENT_URL` are required; everything
    /// else has a default or is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = required("BOT_TOKEN")?;
        let channel_id = parse_i64(&required("CHANNEL_ID")?, "CHANNEL_ID")?;
        let document_url = required("DOCUMENT_URL")?;

        let reminder = ReminderConfig {
            interval_days: parse_u32(
                &env_or("REMINDER_INTERVAL_DAYS", "2"),
                "REMINDER_INTERVAL_DAYS",
            )?,
            max_attempts: parse_u32(
                &env_or("REMINDER_MAX_ATTEMPTS", "3"),
                "REMINDER_MAX_ATTEMPTS",
            )?,
            grace: Duration::from_secs(
                parse_u32(&env_or("REMINDER_GRACE_SECONDS", "10"), "REMINDER_GRACE_SECONDS")?
                    as u64,
            ),
        };

        let sheets = match std::env::var("GSHEET_ID") {
            Ok(sheet_id) if !sheet_id.is_empty() => {
                let token = required("GSHEET_TOKEN")?;
                Some(SheetConfig {
                    sheet_id,
                    worksheet: env_or("GSHEET_WORKSHEET", "Leads"),
                    token: SecretString::from(token),
                })
            }
            _ => None,
        };

        let admin_chat_id = match std::env::var("ADMIN_CHAT_ID") {
            Ok(v) if !v.is_empty() => Some(parse_i64(&v, "ADMIN_CHAT_ID")?),
            _ => None,
        };

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            channel_id,
            channel_link: env_or("CHANNEL_LINK", "https://t.me/"),
            manager_contact: env_or("MANAGER_CONTACT", "https://t.me/"),
            admin_chat_id,
            document_url,
            document_filename: env_or("DOCUMENT_FILENAME", "investment_projects.pdf"),
            reminder,
            db_path: env_or("DB_PATH", "./data/leadflow.db"),
            sheets,
        })
    }
}

/// Runtime-mutable document URL with a single synchronized mutation path.
#[derive(Debug, Clone)]
pub struct SharedDocumentUrl {
    inner: Arc<RwLock<String>>,
}

impl SharedDocumentUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(url.into())),
        }
    }

    /// Current document URL.
    pub fn get(&self) -> String {
        self.inner.read().expect("document url lock poisoned").clone()
    }

    /// Replace the document URL (admin command path).
    pub fn set(&self, url: impl Into<String>) {
        *self.inner.write().expect("document url lock poisoned") = url.into();
    }
}

/// Load a dotenv-style `KEY=VALUE` file into the process environment.
///
/// Existing variables are never overridden; a missing or unreadable file is
/// not an error. Inline `#` comments are stripped.
pub fn load_env_file(path: impl AsRef<Path>) {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let mut line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(idx) = line.find('#') {
            line = line[..idx].trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"').trim_matches('\'');
        if !key.is_empty() && !value.is_empty() && std::env::var(key).is_err() {
            // SAFETY: called from main before any threads are spawned.
            unsafe { std::env::set_var(key, value) };
        }
    }
}

// ── Env helpers ─────────────────────────────────────────────────────

fn required(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_i64(value: &str, key: &str) -> Result<i64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected an integer, got '{value}'"),
    })
}

fn parse_u32(value: &str, key: &str) -> Result<u32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected a non-negative integer, got '{value}'"),
    })
}
