//! Reconciliation errors.
//!
//! Only run-fatal conditions surface here. Per-record failures are captured
//! in the run result and never abort a run.

use thiserror::Error;
use tierwarden_directory::{DirectoryError, ErrorKind};

/// Error that aborts a reconciliation run before any mutation.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The configuration file could not be read or parsed.
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A fatal directory error (invalid input or failed query).
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl ReconcileError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        ReconcileError::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ReconcileError::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error for a structurally invalid input.
    pub fn validation(message: impl Into<String>) -> Self {
        ReconcileError::Directory(DirectoryError::validation(message))
    }

    /// Check if this error comes from invalid configuration or input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        match self {
            ReconcileError::Config { .. } => true,
            ReconcileError::Directory(e) => e.kind() == ErrorKind::ValidationFailed,
        }
    }

    /// Get an error code for classification.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ReconcileError::Config { .. } => "CONFIG_ERROR",
            ReconcileError::Directory(e) => e.error_code(),
        }
    }
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
