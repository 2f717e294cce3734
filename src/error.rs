//! Error types for trinketbot.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("REST error: {0}")]
    Rest(#[from] RestError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Gateway connection errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to connect to gateway at {url}: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("Gateway transport closed: {reason}")]
    TransportClosed { reason: String },

    #[error("No heartbeat acknowledgement within {interval:?}")]
    HeartbeatTimeout { interval: Duration },

    #[error("Session invalidated by the platform")]
    SessionInvalidated,

    #[error("Reconnect requested by the platform")]
    ReconnectRequested,

    #[error("Malformed gateway frame: {0}")]
    MalformedFrame(String),

    #[error("Gateway send failed: {0}")]
    SendFailed(String),
}

/// Platform REST call errors.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("{method} {path} failed with status {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

/// Document store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read document {key}: {reason}")]
    Read { key: String, reason: String },

    #[error("Failed to write document {key}: {reason}")]
    Write { key: String, reason: String },

    #[error("Corrupt document {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Workflow engine errors.
///
/// `InvalidInput` and `SessionExpired` are user-facing and always reported
/// on the originating interaction handle; they never tear down state that
/// the user could still retry from.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Session expired. Please start again from the Create Listing button.")]
    SessionExpired,

    #[error("You can only create a listing once every {window_days} days. Next listing available: {next_eligible}.")]
    CooldownActive {
        window_days: i64,
        next_eligible: String,
    },

    #[error("You don't have permission to do that.")]
    PermissionDenied,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("REST error: {0}")]
    Rest(#[from] RestError),
}

/// Listing publish errors.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("None of the selected tags were found.")]
    NoValidTags,

    #[error("Failed to create the listing thread: {reason}")]
    CreationFailed { reason: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("REST error: {0}")]
    Rest(#[from] RestError),
}

impl WorkflowError {
    /// True when the error should be shown to the user verbatim rather
    /// than as a generic failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::SessionExpired
                | Self::CooldownActive { .. }
                | Self::PermissionDenied
                | Self::Publish(PublishError::NoValidTags)
        )
    }
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
