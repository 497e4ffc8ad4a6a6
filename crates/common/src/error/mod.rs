//! Common error types and classification for Cadence crates
//!
//! This module provides the error vocabulary shared by every Cadence crate:
//!
//! 1. **`CommonError`**: error patterns that are not specific to task
//!    execution (configuration, validation, timeouts, serialization)
//!
//! 2. **`ErrorClassification` trait**: a standard interface for classifying
//!    errors by retryability and severity
//!
//! 3. **`ErrorSeverity` enum**: a unified severity scale used when deciding
//!    the tracing level of an error
//!
//! ## Composition
//!
//! Crate-specific errors compose with `CommonError` instead of duplicating
//! its variants:
//!
//! ```rust,ignore
//! #[derive(Debug, Error)]
//! pub enum ExecutorError {
//!     #[error("task rejected by executor '{executor}'")]
//!     Rejected { executor: String },
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//! ```
//!
//! ## Severity Levels
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Info** | Expected outcomes | Task cancelled |
//! | **Warning** | Degraded but operational | Timeouts, rejected submissions |
//! | **Error** | Failure requiring attention | Invalid configuration, task failure |
//! | **Critical** | Invariant violated | Internal errors |

use std::fmt;
use std::time::Duration;

/// Standard result type using CommonError
pub type CommonResult<T> = Result<T, CommonError>;

/// Error variants shared across Cadence crates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Configuration-related errors
    Config { message: String, field: Option<String> },

    /// Serialization or deserialization errors
    Serialization { message: String, format: Option<String> },

    /// Timeout errors
    Timeout { operation: String, duration: Duration },

    /// Validation errors
    Validation { field: String, message: String, value: Option<String> },

    /// Internal errors that shouldn't normally occur
    Internal { message: String, context: Option<String> },

    /// Task cancellation
    TaskCancelled { task_id: String, reason: Option<String> },
}

impl fmt::Display for CommonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { message, field } => {
                if let Some(field) = field {
                    write!(f, "Configuration error in field '{}': {}", field, message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
            Self::Serialization { message, format } => {
                if let Some(format) = format {
                    write!(f, "Serialization error ({}): {}", format, message)
                } else {
                    write!(f, "Serialization error: {}", message)
                }
            }
            Self::Timeout { operation, duration } => {
                write!(f, "Operation '{}' timed out after {:?}", operation, duration)
            }
            Self::Validation { field, message, value } => {
                if let Some(value) = value {
                    write!(
                        f,
                        "Validation error for field '{}' (value: '{}'): {}",
                        field, value, message
                    )
                } else {
                    write!(f, "Validation error for field '{}': {}", field, message)
                }
            }
            Self::Internal { message, context } => {
                if let Some(ctx) = context {
                    write!(f, "Internal error in '{}': {}", ctx, message)
                } else {
                    write!(f, "Internal error: {}", message)
                }
            }
            Self::TaskCancelled { task_id, reason } => {
                if let Some(reason) = reason {
                    write!(f, "Task '{}' cancelled: {}", task_id, reason)
                } else {
                    write!(f, "Task '{}' cancelled", task_id)
                }
            }
        }
    }
}

impl std::error::Error for CommonError {}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config { .. } | Self::Serialization { .. } | Self::Validation { .. } => {
                ErrorSeverity::Error
            }
            Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Internal { .. } => ErrorSeverity::Critical,
            Self::TaskCancelled { .. } => ErrorSeverity::Info,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl CommonError {
    /// Create a simple configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Create a configuration error for a specific field
    pub fn config_field<S: Into<String>, F: Into<String>>(field: F, message: S) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    /// Create a serialization error with format information
    pub fn serialization_format<S: Into<String>, F: Into<String>>(format: F, message: S) -> Self {
        Self::Serialization { message: message.into(), format: Some(format.into()) }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    /// Create a validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation { field: field.into(), message: message.into(), value: None }
    }

    /// Create a validation error with the invalid value
    pub fn validation_with_value<F: Into<String>, M: Into<String>, V: Into<String>>(
        field: F,
        message: M,
        value: V,
    ) -> Self {
        Self::Validation { field: field.into(), message: message.into(), value: Some(value.into()) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), context: None }
    }

    /// Create a task cancelled error
    pub fn task_cancelled<S: Into<String>>(task_id: S) -> Self {
        Self::TaskCancelled { task_id: task_id.into(), reason: None }
    }

    /// Create a task cancelled error with a reason
    pub fn task_cancelled_with_reason<S: Into<String>, R: Into<String>>(
        task_id: S,
        reason: R,
    ) -> Self {
        Self::TaskCancelled { task_id: task_id.into(), reason: Some(reason.into()) }
    }

    /// Short machine-readable name of the variant, used as a tracing field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Serialization { .. } => "serialization",
            Self::Timeout { .. } => "timeout",
            Self::Validation { .. } => "validation",
            Self::Internal { .. } => "internal",
            Self::TaskCancelled { .. } => "task_cancelled",
        }
    }
}

impl From<toml::de::Error> for CommonError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization_format("TOML", err.to_string())
    }
}

/// Trait for classifying errors by their characteristics
///
/// Implemented by every error type in the workspace so callers can decide
/// uniformly whether to retry and how loudly to log.
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient: a timed-out wait may succeed when
    /// attempted again with a longer bound.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error handling functionality
    //!
    //! Tests cover every variant's display format, severity and
    //! retryability, plus the TOML conversion.

    use super::*;

    /// Validates `CommonError::config` behavior for the error config simple
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `err.to_string()` equals `"Configuration error: invalid
    ///   configuration"`.
    /// - Ensures `!err.is_retryable()` evaluates to true.
    /// - Confirms `err.severity()` equals `ErrorSeverity::Error`.
    #[test]
    fn test_error_config_simple() {
        let err = CommonError::config("invalid configuration");
        assert_eq!(err.to_string(), "Configuration error: invalid configuration");
        assert!(!err.is_retryable());
        assert!(!err.is_critical());
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }

    /// Validates `CommonError::config_field` behavior for the error config with
    /// field scenario.
    ///
    /// Assertions:
    /// - Confirms `err.to_string()` names the offending field.
    #[test]
    fn test_error_config_with_field() {
        let err = CommonError::config_field("name", "must not be empty");
        assert_eq!(err.to_string(), "Configuration error in field 'name': must not be empty");
    }

    /// Validates `CommonError::timeout` behavior.
    ///
    /// Assertions:
    /// - Ensures `err.is_retryable()` evaluates to true.
    /// - Confirms `err.severity()` equals `ErrorSeverity::Warning`.
    #[test]
    fn test_error_timeout() {
        let err = CommonError::timeout("await_termination", Duration::from_secs(5));
        assert_eq!(err.to_string(), "Operation 'await_termination' timed out after 5s");
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert_eq!(err.retry_after(), None);
    }

    /// Validates `CommonError::validation_with_value` display formatting.
    #[test]
    fn test_error_validation_with_value() {
        let err = CommonError::validation_with_value("period", "must be positive", "0ns");
        assert_eq!(
            err.to_string(),
            "Validation error for field 'period' (value: '0ns'): must be positive"
        );
        assert_eq!(err.kind(), "validation");
    }

    /// Validates `CommonError::internal` is the only critical variant.
    #[test]
    fn test_error_internal_is_critical() {
        let err = CommonError::internal("registry out of sync");
        assert!(err.is_critical());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(!CommonError::task_cancelled("t-1").is_critical());
    }

    /// Validates the task cancelled variants.
    ///
    /// Assertions:
    /// - Confirms the reason is appended when present.
    /// - Confirms `severity()` equals `ErrorSeverity::Info`.
    #[test]
    fn test_task_cancelled() {
        let plain = CommonError::task_cancelled("t-7");
        assert_eq!(plain.to_string(), "Task 't-7' cancelled");

        let with_reason = CommonError::task_cancelled_with_reason("t-7", "shutdown");
        assert_eq!(with_reason.to_string(), "Task 't-7' cancelled: shutdown");
        assert_eq!(with_reason.severity(), ErrorSeverity::Info);
    }

    /// Validates the severity ordering used for log-level decisions.
    #[test]
    fn test_error_severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Warning < ErrorSeverity::Error);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Critical.to_string(), "CRITICAL");
    }

    /// Validates conversion from a TOML parse failure.
    #[test]
    fn test_conversion_from_toml_de_error() {
        let parse_err = toml::from_str::<toml::Table>("name = ").unwrap_err();
        let err = CommonError::from(parse_err);
        assert!(matches!(
            err,
            CommonError::Serialization { ref format, .. } if format.as_deref() == Some("TOML")
        ));
    }
}
