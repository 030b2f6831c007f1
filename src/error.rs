//! Error types for leadflow.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),
}

/// Configuration-related errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Malformed stored value in lead {lead_id}: {reason}")]
    Corrupt { lead_id: i64, reason: String },
}

/// Chat-transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Spreadsheet-mirror errors. Always logged and swallowed at call sites.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("Sheets request failed: {0}")]
    Request(String),

    #[error("Unexpected Sheets response: {0}")]
    InvalidResponse(String),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
