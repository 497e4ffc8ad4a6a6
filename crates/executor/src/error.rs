//! Executor error types

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use cadence_common::error::{CommonError, ErrorClassification, ErrorSeverity};
use thiserror::Error;

/// Error raised by a task body, shared between every reader of a future
pub type TaskCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Executor-specific errors
///
/// `Rejected`, `InvalidArgument` and `Config` are raised synchronously by
/// the call that caused them. `Execution`, `Cancelled` and `Timeout` are
/// only observed through future accessors and the bulk invocation calls.
#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    /// Submission attempted after shutdown; the task never ran
    #[error("Task rejected: executor '{executor}' is shut down")]
    Rejected { executor: String },

    /// The task body failed
    #[error("Task failed: {cause}")]
    Execution {
        #[source]
        cause: TaskCause,
    },

    /// The task was cancelled before it produced a result
    #[error("Task was cancelled")]
    Cancelled,

    /// A bounded wait elapsed first
    #[error("Timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Executor could not be configured
    #[error("Executor configuration error: {message}")]
    Config { message: String },
}

impl ExecutorError {
    pub(crate) fn rejected(executor: &str) -> Self {
        Self::Rejected { executor: executor.to_string() }
    }

    pub(crate) fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// The original error of a failed task, if this is an execution failure
    pub fn cause(&self) -> Option<&TaskCause> {
        match self {
            Self::Execution { cause } => Some(cause),
            _ => None,
        }
    }

    /// Short machine-readable name of the variant, used as a tracing field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Execution { .. } => "execution",
            Self::Cancelled => "cancelled",
            Self::Timeout { .. } => "timeout",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Config { .. } => "config",
        }
    }
}

impl From<CommonError> for ExecutorError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Timeout { duration, .. } => Self::Timeout { duration },
            CommonError::TaskCancelled { .. } => Self::Cancelled,
            CommonError::Validation { .. } => Self::InvalidArgument { message: err.to_string() },
            other => Self::Config { message: other.to_string() },
        }
    }
}

impl ErrorClassification for ExecutorError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled => ErrorSeverity::Info,
            Self::Rejected { .. } | Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Execution { .. } | Self::InvalidArgument { .. } | Self::Config { .. } => {
                ErrorSeverity::Error
            }
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Convenience type alias for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;
