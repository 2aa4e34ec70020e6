//! Directory error types
//!
//! Error definitions with fatal/per-record and transient/permanent
//! classification, so callers never depend on provider-specific errors.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error that can occur while querying or mutating a directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    // Fatal for the whole run
    /// The directory could not be reached or the query was rejected.
    #[error("query failed: {message}")]
    QueryFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An input (search base, filter, exclusion entry) was structurally invalid.
    #[error("validation failed: {message}")]
    ValidationFailed { message: String },

    // Per-record
    /// The targeted object disappeared between query and apply.
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// The caller lacks rights to mutate the object.
    #[error("access denied: cannot {operation} on {identifier}")]
    AccessDenied {
        identifier: String,
        operation: String,
    },

    /// The directory call exceeded its deadline.
    #[error("{operation} timed out after {timeout_secs} seconds")]
    Timeout { operation: String, timeout_secs: u64 },

    /// The directory server was unreachable during a mutation.
    #[error("directory unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Any other provider rejection of a single operation.
    #[error("operation failed: {message}")]
    OperationFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Coarse error classification reported in run results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    QueryFailed,
    ValidationFailed,
    ObjectNotFound,
    AccessDenied,
    Timeout,
    Unavailable,
    OperationFailed,
}

impl ErrorKind {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::QueryFailed => "query_failed",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::ObjectNotFound => "object_not_found",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::OperationFailed => "operation_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl DirectoryError {
    /// Get the coarse kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            DirectoryError::QueryFailed { .. } => ErrorKind::QueryFailed,
            DirectoryError::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            DirectoryError::ObjectNotFound { .. } => ErrorKind::ObjectNotFound,
            DirectoryError::AccessDenied { .. } => ErrorKind::AccessDenied,
            DirectoryError::Timeout { .. } => ErrorKind::Timeout,
            DirectoryError::Unavailable { .. } => ErrorKind::Unavailable,
            DirectoryError::OperationFailed { .. } => ErrorKind::OperationFailed,
        }
    }

    /// Check if this error aborts the whole run.
    ///
    /// Fatal errors are raised before any mutation is attempted; nothing
    /// observed after them is trustworthy.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DirectoryError::QueryFailed { .. } | DirectoryError::ValidationFailed { .. }
        )
    }

    /// Check if this error is transient and the call may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DirectoryError::Timeout { .. } | DirectoryError::Unavailable { .. }
        )
    }

    /// Get an error code for classification.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::QueryFailed { .. } => "QUERY_FAILED",
            DirectoryError::ValidationFailed { .. } => "VALIDATION_FAILED",
            DirectoryError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            DirectoryError::AccessDenied { .. } => "ACCESS_DENIED",
            DirectoryError::Timeout { .. } => "TIMEOUT",
            DirectoryError::Unavailable { .. } => "UNAVAILABLE",
            DirectoryError::OperationFailed { .. } => "OPERATION_FAILED",
        }
    }

    // Convenience constructors

    /// Create a query failed error.
    pub fn query_failed(message: impl Into<String>) -> Self {
        DirectoryError::QueryFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a query failed error with source.
    pub fn query_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::QueryFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        DirectoryError::ValidationFailed {
            message: message.into(),
        }
    }

    /// Create an object not found error.
    pub fn not_found(identifier: impl Into<String>) -> Self {
        DirectoryError::ObjectNotFound {
            identifier: identifier.into(),
        }
    }

    /// Create an access denied error.
    pub fn access_denied(identifier: impl Into<String>, operation: impl Into<String>) -> Self {
        DirectoryError::AccessDenied {
            identifier: identifier.into(),
            operation: operation.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        DirectoryError::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Create an unavailable error with source.
    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(message: impl Into<String>) -> Self {
        DirectoryError::OperationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::OperationFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        let fatal = vec![
            DirectoryError::query_failed("unreachable"),
            DirectoryError::validation("bad base"),
        ];

        for err in fatal {
            assert!(err.is_fatal(), "Expected {} to be fatal", err.error_code());
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn test_per_record_errors() {
        let per_record = vec![
            DirectoryError::not_found("alice"),
            DirectoryError::access_denied("krbtgt", "disable"),
            DirectoryError::Timeout {
                operation: "add_to_group".to_string(),
                timeout_secs: 30,
            },
            DirectoryError::unavailable("connection reset"),
            DirectoryError::operation_failed("constraint violation"),
        ];

        for err in per_record {
            assert!(
                !err.is_fatal(),
                "Expected {} to be per-record",
                err.error_code()
            );
        }
    }

    #[test]
    fn test_transient_errors() {
        assert!(DirectoryError::unavailable("down").is_transient());
        assert!(DirectoryError::Timeout {
            operation: "delete".to_string(),
            timeout_secs: 5,
        }
        .is_transient());
        assert!(!DirectoryError::access_denied("a", "delete").is_transient());
        assert!(!DirectoryError::not_found("a").is_transient());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            DirectoryError::not_found("bob").kind(),
            ErrorKind::ObjectNotFound
        );
        assert_eq!(
            DirectoryError::access_denied("bob", "delete").kind(),
            ErrorKind::AccessDenied
        );
        assert_eq!(ErrorKind::AccessDenied.to_string(), "access_denied");
    }

    #[test]
    fn test_error_display() {
        let err = DirectoryError::Timeout {
            operation: "disable".to_string(),
            timeout_secs: 30,
        };
        assert_eq!(err.to_string(), "disable timed out after 30 seconds");

        let err = DirectoryError::access_denied("krbtgt", "disable");
        assert_eq!(err.to_string(), "access denied: cannot disable on krbtgt");
    }

    #[test]
    fn test_error_with_source() {
        let source_err = std::io::Error::new(std::io::ErrorKind::Other, "underlying error");
        let err = DirectoryError::query_failed_with_source("bind failed", source_err);

        assert!(err.is_fatal());
        if let DirectoryError::QueryFailed { source, .. } = &err {
            assert!(source.is_some());
        } else {
            panic!("Expected QueryFailed variant");
        }
    }
}
