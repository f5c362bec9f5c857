//! Error types for Conduit.
//!
//! This module provides the [`ConduitError`] type, which is the standard error
//! type carried through the middleware pipeline.
//!
//! # Taxonomy
//!
//! | `ErrorCategory` | Typical handling |
//! |---|---|
//! | `Validation`, `Unauthorized`, `Forbidden`, `NotFound`, `Conflict` | Caught by an error boundary and turned into a failure response |
//! | `Transient`, `Timeout` | Candidates for retry |
//! | `Cancelled` | Cooperative cancellation observed by a unit |
//! | `Internal` | Propagates to the outermost boundary |
//!
//! Mapping an error to a concrete wire response is left to adapters; the
//! [`ErrorCategory::default_status_code`] table is only a default.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`ConduitError`].
pub type ConduitResult<T> = Result<T, ConduitError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request validation errors (invalid input).
    Validation,
    /// Missing or invalid credentials.
    Unauthorized,
    /// Permission denied.
    Forbidden,
    /// Resource not found.
    NotFound,
    /// Conflict (e.g., concurrent modification).
    Conflict,
    /// Transient failure of a downstream dependency.
    Transient,
    /// An operation exceeded its deadline.
    Timeout,
    /// Work was abandoned or cancelled.
    Cancelled,
    /// Internal or unexpected errors.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Transient => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for categories that usually succeed when retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }

    /// Returns the snake_case name of the category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

/// Standard error type for Conduit.
///
/// Every middleware unit returns `Result<(), ConduitError>`. Nothing in the
/// pipeline catches these implicitly; error boundaries are composed in
/// explicitly.
///
/// # Example
///
/// ```
/// use conduit_core::{ConduitError, ErrorCategory};
///
/// fn validate(name: &str) -> Result<(), ConduitError> {
///     if name.is_empty() {
///         return Err(ConduitError::validation("name cannot be empty"));
///     }
///     Ok(())
/// }
///
/// let err = validate("").unwrap_err();
/// assert_eq!(err.category(), ErrorCategory::Validation);
/// ```
#[derive(Error, Debug)]
pub enum ConduitError {
    /// Request validation failed.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Missing or invalid credentials.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Human-readable error message.
        message: String,
    },

    /// Permission denied.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Human-readable error message.
        message: String,
    },

    /// Resource not found.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Conflict error (e.g., concurrent modification).
    #[error("Conflict: {message}")]
    Conflict {
        /// Human-readable error message.
        message: String,
    },

    /// A downstream dependency failed in a way that may succeed on retry.
    #[error("Transient error: {message}")]
    Transient {
        /// Human-readable error message.
        message: String,
    },

    /// An operation did not complete before its deadline.
    #[error("Timed out after {after:?}: {message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// Work was cancelled or its continuation abandoned.
    #[error("Cancelled: {message}")]
    Cancelled {
        /// Human-readable error message.
        message: String,
    },

    /// An operation required an ambient context scope but none was active.
    #[error("No active context scope")]
    NoActiveScope,

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl ConduitError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a timeout error for the given deadline.
    #[must_use]
    pub fn timeout(message: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            message: message.into(),
            after,
        }
    }

    /// Creates a cancelled error.
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Unauthorized { .. } => ErrorCategory::Unauthorized,
            Self::Forbidden { .. } => ErrorCategory::Forbidden,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Transient { .. } => ErrorCategory::Transient,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Cancelled { .. } => ErrorCategory::Cancelled,
            Self::NoActiveScope | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the default HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Returns `true` if the error is a transient or timeout failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.category().is_transient()
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<anyhow::Error> for ConduitError {
    fn from(source: anyhow::Error) -> Self {
        Self::Internal {
            message: source.to_string(),
            source: Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let error = ConduitError::validation("Invalid email format");
        assert_eq!(error.category(), ErrorCategory::Validation);
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert!(error.to_string().contains("Invalid email format"));
    }

    #[test]
    fn test_timeout_error_display() {
        let error = ConduitError::timeout("slow unit", Duration::from_millis(10));
        assert!(error.is_timeout());
        assert!(error.is_transient());
        assert_eq!(error.to_string(), "Timed out after 10ms: slow unit");
    }

    #[test]
    fn test_no_active_scope_is_internal() {
        let error = ConduitError::NoActiveScope;
        assert_eq!(error.category(), ErrorCategory::Internal);
        assert!(!error.is_transient());
    }

    #[test]
    fn test_internal_with_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let error = ConduitError::internal_with_source("write failed", io);
        let source = std::error::Error::source(&error).expect("source should be kept");
        assert!(source.to_string().contains("disk gone"));
    }

    #[test]
    fn test_from_anyhow() {
        let error: ConduitError = anyhow::anyhow!("boom").into();
        assert_eq!(error.category(), ErrorCategory::Internal);
        assert!(error.to_string().contains("boom"));
    }

    #[test]
    fn test_transient_categories() {
        assert!(ErrorCategory::Transient.is_transient());
        assert!(ErrorCategory::Timeout.is_transient());
        assert!(!ErrorCategory::Validation.is_transient());
        assert!(!ErrorCategory::Internal.is_transient());
    }

    #[test]
    fn test_all_error_categories_have_status_codes() {
        let categories = [
            ErrorCategory::Validation,
            ErrorCategory::Unauthorized,
            ErrorCategory::Forbidden,
            ErrorCategory::NotFound,
            ErrorCategory::Conflict,
            ErrorCategory::Transient,
            ErrorCategory::Timeout,
            ErrorCategory::Cancelled,
            ErrorCategory::Internal,
        ];

        for category in categories {
            let status = category.default_status_code();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "Category {:?} should map to error status code, got {}",
                category,
                status
            );
        }
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&ErrorCategory::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
        assert_eq!(ErrorCategory::NotFound.as_str(), "not_found");
    }
}
