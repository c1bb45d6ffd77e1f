//! Error kinds for the task coordination service.
//!
//! One variant per abstract kind from the error-handling design: every
//! public operation returns `Result<T>` and never swallows an error.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaskError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("not assigned: {0}")]
    NotAssigned(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("cycle detected: {0}")]
    CycleDetected(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl TaskError {
    /// Machine-readable kind token required by §7; never leaks internal
    /// handles or credentials — only the `Display` detail may carry context,
    /// and callers are responsible for keeping that context user-safe.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskError::ValidationError(_) => "ValidationError",
            TaskError::NotFound(_) => "NotFound",
            TaskError::Unavailable(_) => "Unavailable",
            TaskError::NotAssigned(_) => "NotAssigned",
            TaskError::InvalidTransition(_) => "InvalidTransition",
            TaskError::CycleDetected(_) => "CycleDetected",
            TaskError::Conflict(_) => "Conflict",
            TaskError::TransactionAborted(_) => "TransactionAborted",
            TaskError::Fatal(_) => "Fatal",
        }
    }

    /// Whether the failure is safe to retry internally against the Store.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::TransactionAborted(_))
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        TaskError::NotFound(format!("{entity} {id} not found"))
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        TaskError::Unavailable(detail.into())
    }

    pub fn not_assigned(agent_id: &str, task_id: i64) -> Self {
        TaskError::NotAssigned(format!("agent {agent_id} is not assigned to task {task_id}"))
    }

    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        TaskError::InvalidTransition(format!("cannot transition from {from} to {to}"))
    }

    pub fn cycle_detected(detail: impl Into<String>) -> Self {
        TaskError::CycleDetected(detail.into())
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        TaskError::Conflict(detail.into())
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        TaskError::ValidationError(detail.into())
    }
}

/// Formats a `{success:false, error:"<kind>: <detail>"}` string per §4.8.
impl TaskError {
    pub fn as_tool_error(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tokens_are_stable() {
        assert_eq!(TaskError::NotFound("x".into()).kind(), "NotFound");
        assert_eq!(
            TaskError::TransactionAborted("retry budget exhausted".into()).kind(),
            "TransactionAborted"
        );
    }

    #[test]
    fn only_transaction_aborted_is_retryable() {
        assert!(TaskError::TransactionAborted("x".into()).is_retryable());
        assert!(!TaskError::Conflict("x".into()).is_retryable());
        assert!(!TaskError::Fatal("x".into()).is_retryable());
    }

    #[test]
    fn tool_error_embeds_kind_prefix() {
        let err = TaskError::not_found("task", 42);
        assert_eq!(err.as_tool_error(), "NotFound: not found: task 42 not found");
    }
}
