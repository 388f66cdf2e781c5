//! Error types for Shop Assist.

/// Configuration-related errors.
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

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Messaging channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Authentication failed for channel {name}: {reason}")]
    AuthFailed { name: String, reason: String },
}

/// Calendar reservation errors.
#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("Calendar is not configured")]
    NotConfigured,

    #[error("Calendar request failed: {0}")]
    RequestFailed(String),

    #[error("Calendar rejected the event ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Errors a single dialogue step can surface to the engine.
///
/// User-input problems never appear here: they are answered in place with a
/// reprompt and the session is kept. Calendar failures are answered in place
/// too, with a booking-failed notice that ends the conversation.
#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error("Session for {identity} is in an unroutable state: {reason}")]
    Unroutable { identity: String, reason: String },

    #[error("Persistence failed: {0}")]
    Database(#[from] DatabaseError),
}
