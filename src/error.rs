//! Error types for the relay.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Template parsing, rendering and persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Single '{brace}' at position {position} in template")]
    UnbalancedBrace { brace: char, position: usize },

    #[error("Unsupported replacement field {{{field}}}; only {{}} or {{0}} are allowed")]
    UnsupportedField { field: String },

    #[error("Template has more than one {{}} slot but only one value is substituted")]
    TooManySlots,

    #[error("Cannot mix automatic {{}} and manual {{0}} field numbering")]
    MixedNumbering,

    #[error("Failed to persist template: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by one delivery through the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Formatting failed, nothing sent: {0}")]
    Format(#[from] TemplateError),

    #[error("Send failed: {0}")]
    Send(#[from] ChannelError),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
