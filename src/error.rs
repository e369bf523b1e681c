//! Error types for inbox-digest.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Startup failures surfaced by `main`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mail source errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("Mailbox authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Mailbox protocol error: {0}")]
    Protocol(String),

    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Invalid message id: {0}")]
    InvalidId(String),

    #[error("Failed to parse message {id}: {reason}")]
    Parse { id: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} returned an empty completion")]
    EmptyResponse { provider: String },
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
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Insufficient permissions to access the spreadsheet: {0}")]
    PermissionDenied(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// The external service an adapter call was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Adapter {
    Mail,
    Summarizer,
    Store,
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Adapter::Mail => "mail",
            Adapter::Summarizer => "summarizer",
            Adapter::Store => "store",
        };
        f.write_str(name)
    }
}

/// Why a run failed, as seen by the orchestrator.
///
/// Timeouts and provider failures abort a run in exactly the same way;
/// the distinction is kept only for observability. `Aborted` covers a run
/// task that died (an adapter panicked) before producing a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterError {
    #[error("{adapter} unavailable during {operation}: {reason}")]
    Unavailable {
        adapter: Adapter,
        operation: &'static str,
        reason: String,
    },

    #[error("{adapter} timed out during {operation} after {timeout:?}")]
    Timeout {
        adapter: Adapter,
        operation: &'static str,
        timeout: Duration,
    },

    #[error("run aborted: {reason}")]
    Aborted { reason: String },
}

impl AdapterError {
    /// The adapter that failed; `None` when the run task itself died.
    pub fn adapter(&self) -> Option<Adapter> {
        match self {
            AdapterError::Unavailable { adapter, .. } | AdapterError::Timeout { adapter, .. } => {
                Some(*adapter)
            }
            AdapterError::Aborted { .. } => None,
        }
    }

    pub fn operation(&self) -> Option<&'static str> {
        match self {
            AdapterError::Unavailable { operation, .. }
            | AdapterError::Timeout { operation, .. } => Some(operation),
            AdapterError::Aborted { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AdapterError::Timeout { .. })
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
