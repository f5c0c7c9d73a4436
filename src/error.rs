//! Error types for Converse.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures talking to the wallet backend.
///
/// These never cross the router boundary: the action client folds them
/// into `ActionResult { success: false, .. }` so every caller checks a
/// result instead of catching an error.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{action} request failed: {reason}")]
    Request { action: &'static str, reason: String },

    #[error("{action} returned HTTP {status}: {message}")]
    Status {
        action: &'static str,
        status: u16,
        message: String,
    },

    #[error("{action} returned an unparseable response: {reason}")]
    InvalidResponse { action: &'static str, reason: String },
}

/// Failures of the intent-classification capability.
///
/// The router maps any of these to a `clarification_needed` reply; they
/// never reach the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classification request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("classifier output did not match the task schema: {reason}")]
    InvalidOutput { reason: String },
}

/// Transport adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
