//! Error types for the authorization server core.

use thiserror::Error;

/// Result type alias for the authorization server core.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Main error type for the authorization server core.
///
/// Protocol-level failures (invalid_request, invalid_grant, ...) never
/// surface here: they are carried on the event context and end up in the
/// response message. This type covers everything that is a fault of the
/// host, the configuration or the infrastructure.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Missing required handlers, missing core services, inconsistent options.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The operation cannot be performed in the current state (e.g. issuer
    /// inference without a host header).
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Optimistic-update conflict. The caller must reload and retry.
    #[error("Concurrency error: {message}")]
    Concurrency { message: String },

    /// Aggregate of entity validation messages.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Cryptography errors
    #[error("Cryptography error: {message}")]
    Crypto { message: String },

    /// The transaction was cancelled before the pipeline completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// A finite sequence of one-line validation messages produced by a manager.
#[derive(Error, Debug)]
#[error("{}", .messages.join("; "))]
pub struct ValidationError {
    messages: Vec<String>,
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Entity not found")]
    NotFound,

    #[error("Operation failed: {message}")]
    OperationFailed { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Storage backend not available")]
    BackendUnavailable,

    /// Aggregate failure collected by a paged operation such as prune.
    #[error("{failures} of {pages} pages failed: {}", .messages.join("; "))]
    Partial {
        pages: usize,
        failures: usize,
        messages: Vec<String>,
    },
}

impl ServerError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create a new concurrency error
    pub fn concurrency(message: impl Into<String>) -> Self {
        Self::Concurrency {
            message: message.into(),
        }
    }

    /// Create a new crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error signals an optimistic concurrency conflict.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, Self::Concurrency { .. })
    }
}

impl ValidationError {
    pub fn new(messages: Vec<String>) -> Self {
        Self { messages }
    }

    /// The individual one-line messages.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl StorageError {
    /// Create a new operation failed error
    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::OperationFailed {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}
