//! Error types for the mail agent.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Ticketing error: {0}")]
    Ticketing(#[from] TicketingError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox provider errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mailbox authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Invalid response from mail API: {reason}")]
    InvalidResponse { reason: String },
}

/// Ticketing provider errors.
#[derive(Debug, thiserror::Error)]
pub enum TicketingError {
    #[error("Ticketing login failed: {reason}")]
    AuthFailed { reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ticketing API rejected request with {status}: {body}")]
    RemoteRejection {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Invalid response from ticketing API: {reason}")]
    InvalidResponse { reason: String },
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
