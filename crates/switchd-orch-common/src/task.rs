//! Per-task outcome classification.

use thiserror::Error;

/// Result of processing a single backlog task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Task completed successfully
    Success,
    /// Task carried invalid input and was dropped
    InvalidEntry,
    /// Task failed; it stays in the backlog
    Failed,
    /// Task is waiting for a dependency; it stays in the backlog
    NeedRetry,
    /// Task was a no-op (duplicate of applied state)
    Ignore,
    /// Task hit an unrecoverable hardware failure; the component cannot
    /// make further progress
    Fatal,
}

impl TaskStatus {
    /// Returns true if the task is finished and leaves the backlog.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Ignore | TaskStatus::InvalidEntry
        )
    }

    /// Returns true if the task stays in the backlog for the next cycle.
    pub fn is_retained(&self) -> bool {
        matches!(self, TaskStatus::NeedRetry | TaskStatus::Failed)
    }

    /// Returns true for the unrecoverable classification.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskStatus::Fatal)
    }
}

/// Error type for task processing failures.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The entry data could not be parsed or is out of range
    #[error("invalid entry: {message}")]
    InvalidEntry { message: String },

    /// A hardware call failed; the task is retried
    #[error("hardware error: {message}")]
    HalError { message: String },

    /// A dependency (port, RIF, VRF) does not exist yet
    #[error("waiting for dependency: {dependency}")]
    WaitingForDependency { dependency: String },

    /// An invariant refuses the operation for now (overlap, ref count)
    #[error("retry needed: {reason}")]
    NeedRetry { reason: String },

    /// Unrecoverable hardware failure; no retry can succeed
    #[error("fatal: {message}")]
    Fatal { message: String },
}

impl TaskError {
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        TaskError::InvalidEntry {
            message: message.into(),
        }
    }

    pub fn hal_error(message: impl Into<String>) -> Self {
        TaskError::HalError {
            message: message.into(),
        }
    }

    pub fn waiting_for(dependency: impl Into<String>) -> Self {
        TaskError::WaitingForDependency {
            dependency: dependency.into(),
        }
    }

    pub fn need_retry(reason: impl Into<String>) -> Self {
        TaskError::NeedRetry {
            reason: reason.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        TaskError::Fatal {
            message: message.into(),
        }
    }

    /// Returns true for the unrecoverable classification.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskError::Fatal { .. })
    }

    /// Converts this error to a TaskStatus.
    pub fn to_status(&self) -> TaskStatus {
        match self {
            TaskError::InvalidEntry { .. } => TaskStatus::InvalidEntry,
            TaskError::HalError { .. } => TaskStatus::Failed,
            TaskError::WaitingForDependency { .. } => TaskStatus::NeedRetry,
            TaskError::NeedRetry { .. } => TaskStatus::NeedRetry,
            TaskError::Fatal { .. } => TaskStatus::Fatal,
        }
    }
}

/// Result type for task processing.
pub type TaskResult<T> = Result<T, TaskError>;

/// Extension trait for converting a TaskResult to a TaskStatus.
pub trait TaskResultExt {
    fn to_status(&self) -> TaskStatus;
}

impl<T> TaskResultExt for TaskResult<T> {
    fn to_status(&self) -> TaskStatus {
        match self {
            Ok(_) => TaskStatus::Success,
            Err(e) => e.to_status(),
        }
    }
}
