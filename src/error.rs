//! Error types for BCR Sync.

/// Top-level error type for the sync pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Message source error: {0}")]
    Source(#[from] SourceError),

    #[error("Ledger sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Extraction failures. All are recoverable at message granularity:
/// the orchestrator skips the message and leaves it unread.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("message body is empty")]
    EmptyInput,

    #[error("no transaction data found in message body")]
    NoTransactionData,

    #[error("transaction data found but required fields are missing")]
    IncompleteData,
}

/// Categorization oracle errors. Never surfaced past the classifier —
/// every variant degrades to the `Uncategorized` sentinel.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("invalid oracle response: {reason}")]
    InvalidResponse { reason: String },
}

/// Message source errors. A failed listing is fatal to the run; a failed
/// acknowledgment after a durable append is logged and accepted.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("message source unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("invalid message source response: {reason}")]
    InvalidResponse { reason: String },

    #[error("failed to acknowledge message {id}: {reason}")]
    AckFailed { id: String, reason: String },
}

/// Ledger sink errors, split by retryability.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Rate limits, server errors, transport failures. Retried with backoff.
    #[error("transient sink failure: {reason}")]
    Transient { reason: String },

    /// Permission, not-found, malformed-target. Never retried.
    #[error("permanent sink failure ({status}): {reason}")]
    Permanent { status: u16, reason: String },
}

impl SinkError {
    /// Classify an HTTP status into transient vs permanent.
    pub fn from_status(status: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match status {
            400 | 403 | 404 => SinkError::Permanent { status, reason },
            _ => SinkError::Transient {
                reason: format!("HTTP {status}: {reason}"),
            },
        }
    }

    /// Whether the append retry loop should try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient { .. })
    }
}

/// Result type alias for the sync pipeline.
pub type Result<T> = std::result::Result<T, Error>;
