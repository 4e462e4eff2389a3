//! # Error Types
//!
//! Error types for the credential vault using `thiserror`. Every variant maps
//! onto one of the four caller-facing kinds (see [`ErrorKind`]) so that the
//! resolver and the audit layer can branch on the kind rather than on the
//! concrete failure.

use std::fmt;

/// Custom result type for credential vault operations
pub type Result<T> = std::result::Result<T, CredvaultError>;

/// Main error type for the credential vault
#[derive(thiserror::Error, Debug)]
pub enum CredvaultError {
    /// Requested record or vault entry does not exist
    #[error("Resource not found: {resource_type} '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Caller is not the trusted execution context
    #[error("Forbidden: {operation} requires the trusted execution context")]
    Forbidden { operation: String },

    /// Vault or store could not be reached
    #[error("Unavailable: {operation}: {message}")]
    Unavailable { operation: String, message: String },

    /// Vault or store call exceeded its deadline
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Request violates a data-model constraint and was not persisted
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal errors (crypto failures, corrupted rows)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Caller-facing error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Unavailable,
    ConstraintViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Forbidden => write!(f, "forbidden"),
            ErrorKind::Unavailable => write!(f, "unavailable"),
            ErrorKind::ConstraintViolation => write!(f, "constraint_violation"),
        }
    }
}

impl CredvaultError {
    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a forbidden error
    pub fn forbidden<S: Into<String>>(operation: S) -> Self {
        Self::Forbidden { operation: operation.into() }
    }

    /// Create an unavailable error
    pub fn unavailable<O: Into<String>, M: Into<String>>(operation: O, message: M) -> Self {
        Self::Unavailable { operation: operation.into(), message: message.into() }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    /// Create a constraint violation error
    pub fn constraint<S: Into<String>>(message: S) -> Self {
        Self::ConstraintViolation { message: message.into() }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Wrap a sqlx error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Collapse this error onto the caller-facing taxonomy.
    ///
    /// Storage, timeout and internal failures are all reported as
    /// `Unavailable`: the caller cannot distinguish them and must not fall
    /// through to a lower credential tier on any of them.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CredvaultError::NotFound { .. } => ErrorKind::NotFound,
            CredvaultError::Forbidden { .. } => ErrorKind::Forbidden,
            CredvaultError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            CredvaultError::Unavailable { .. }
            | CredvaultError::Timeout { .. }
            | CredvaultError::Database { .. }
            | CredvaultError::Serialization { .. }
            | CredvaultError::Config { .. }
            | CredvaultError::Internal { .. } => ErrorKind::Unavailable,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_forbidden(&self) -> bool {
        self.kind() == ErrorKind::Forbidden
    }

    /// Check if this error should be retried by the caller
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }

    /// Message safe to show an end user. Never carries vault or store detail.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::ConstraintViolation => "key invalid",
            _ => "no credential available for this feature",
        }
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for CredvaultError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<serde_json::Error> for CredvaultError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for CredvaultError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for CredvaultError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}
