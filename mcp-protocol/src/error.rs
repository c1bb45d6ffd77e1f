//! Error handling for the task-coordination protocol.
//!
//! Maps `TaskError` onto MCP-compliant JSON-RPC error codes.

use serde_json::{json, Value};
use task_core::TaskError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum McpError {
    #[error("validation error: {0}")]
    Validation(String),

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

    #[error("internal error: {0}")]
    Internal(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl McpError {
    pub fn to_error_code(&self) -> i32 {
        match self {
            McpError::Validation(_) => -32001,
            McpError::NotFound(_) => -32002,
            McpError::Unavailable(_) => -32003,
            McpError::NotAssigned(_) => -32004,
            McpError::InvalidTransition(_) => -32005,
            McpError::CycleDetected(_) => -32006,
            McpError::Conflict(_) => -32007,
            McpError::TransactionAborted(_) => -32008,
            McpError::Internal(_) => -32009,
            McpError::Protocol(_) => -32600,
        }
    }

    pub fn to_json_rpc_error(&self, id: Option<Value>) -> Value {
        json!({
            "jsonrpc": "2.0",
            "error": {
                "code": self.to_error_code(),
                "message": self.to_string(),
            },
            "id": id,
        })
    }
}

impl From<TaskError> for McpError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::ValidationError(msg) => McpError::Validation(msg),
            TaskError::NotFound(msg) => McpError::NotFound(msg),
            TaskError::Unavailable(msg) => McpError::Unavailable(msg),
            TaskError::NotAssigned(msg) => McpError::NotAssigned(msg),
            TaskError::InvalidTransition(msg) => McpError::InvalidTransition(msg),
            TaskError::CycleDetected(msg) => McpError::CycleDetected(msg),
            TaskError::Conflict(msg) => McpError::Conflict(msg),
            TaskError::TransactionAborted(msg) => McpError::TransactionAborted(msg),
            TaskError::Fatal(msg) => McpError::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(format!("malformed parameters: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(McpError::NotFound("x".into()).to_error_code(), -32002);
        assert_eq!(McpError::TransactionAborted("x".into()).to_error_code(), -32008);
    }

    #[test]
    fn task_error_conversion_preserves_detail() {
        let err: McpError = TaskError::not_found("task", 42).into();
        assert!(matches!(err, McpError::NotFound(_)));
        assert!(err.to_string().contains("task 42"));
    }

    #[test]
    fn json_rpc_error_shape() {
        let error = McpError::NotFound("task 1 not found".into());
        let envelope = error.to_json_rpc_error(Some(serde_json::json!(7)));
        assert_eq!(envelope["jsonrpc"], "2.0");
        assert_eq!(envelope["error"]["code"], -32002);
        assert_eq!(envelope["id"], 7);
    }
}
