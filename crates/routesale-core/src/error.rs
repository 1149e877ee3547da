//! Error types for routesale-core

use thiserror::Error;

/// Result type alias using routesale-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in routesale-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range input, rejected before any write
    #[error("Validation error: {0}")]
    Validation(String),

    /// Optimistic concurrency check failed
    #[error("Version conflict: expected version {expected}, found {actual}")]
    Conflict { expected: i64, actual: i64 },

    /// Missing aggregate, item, or operation target
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller context is not allowed to perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Another attempt of the same operation is still running
    #[error("Operation in progress: {0}")]
    InProgress(String),

    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// How a client should react to a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Refetch the current state, then reapply
    RetryLater,
    /// The request itself is wrong and must be corrected
    FixAndResubmit,
    /// Not recoverable by the caller
    Fatal,
}

impl ErrorDisposition {
    /// Classify a code as reported in an operation result. Codes this
    /// version does not know are treated as transient.
    #[must_use]
    pub fn for_code(code: &str) -> Self {
        match code {
            "VALIDATION_ERROR" | "NOT_FOUND" | "SERIALIZATION_ERROR" => Self::FixAndResubmit,
            "FORBIDDEN" | "CONFIG_ERROR" => Self::Fatal,
            _ => Self::RetryLater,
        }
    }
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InProgress(_) => "IN_PROGRESS",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    #[must_use]
    pub fn disposition(&self) -> ErrorDisposition {
        ErrorDisposition::for_code(self.code())
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::validation("x").code(), "VALIDATION_ERROR");
        assert_eq!(
            Error::Conflict {
                expected: 1,
                actual: 2
            }
            .code(),
            "CONFLICT"
        );
        assert_eq!(Error::not_found("x").code(), "NOT_FOUND");
        assert_eq!(Error::forbidden("x").code(), "FORBIDDEN");
    }

    #[test]
    fn conflict_means_retry_later() {
        let error = Error::Conflict {
            expected: 3,
            actual: 4,
        };
        assert_eq!(error.disposition(), ErrorDisposition::RetryLater);
        assert!(error.to_string().contains("expected version 3"));
        assert_eq!(
            Error::validation("bad").disposition(),
            ErrorDisposition::FixAndResubmit
        );
    }

    #[test]
    fn result_codes_classify_failures() {
        assert_eq!(
            ErrorDisposition::for_code("NOT_FOUND"),
            ErrorDisposition::FixAndResubmit
        );
        assert_eq!(
            ErrorDisposition::for_code("IN_PROGRESS"),
            ErrorDisposition::RetryLater
        );
        assert_eq!(Error::forbidden("x").disposition(), ErrorDisposition::Fatal);
        assert_eq!(
            ErrorDisposition::for_code("SOMETHING_NEW"),
            ErrorDisposition::RetryLater
        );
    }
}
