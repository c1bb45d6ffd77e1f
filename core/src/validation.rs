//! Boundary validation for task-coordination inputs.
//!
//! Mirrors the boundary tests in the testable-properties section: title
//! length, instruction minimum length, timezone-bearing due dates, and
//! numeric precision are all enforced here rather than at the Store layer,
//! so the Tool Dispatcher can reject bad params before any write is attempted.

use crate::error::{Result, TaskError};
use chrono::{DateTime, Utc};

pub const TITLE_MIN: usize = 3;
pub const TITLE_MAX: usize = 100;
pub const INSTRUCTION_MIN: usize = 10;
pub const HOURS_MIN: f64 = 0.1;
pub const QUERY_LIMIT_MAX: u32 = 1000;

pub struct TaskValidator;

impl TaskValidator {
    pub fn validate_title(title: &str) -> Result<()> {
        let trimmed = title.trim();
        if trimmed.len() < TITLE_MIN || trimmed.len() > TITLE_MAX {
            return Err(TaskError::validation(format!(
                "title must be {TITLE_MIN}-{TITLE_MAX} characters, got {}",
                trimmed.len()
            )));
        }
        Ok(())
    }

    pub fn validate_instruction(field: &str, value: &str) -> Result<()> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(TaskError::validation(format!("{field} must not be empty")));
        }
        if trimmed.len() < INSTRUCTION_MIN {
            return Err(TaskError::validation(format!(
                "{field} must be at least {INSTRUCTION_MIN} characters, got {}",
                trimmed.len()
            )));
        }
        Ok(())
    }

    pub fn validate_non_empty(field: &str, value: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(TaskError::validation(format!("{field} must not be empty")));
        }
        Ok(())
    }

    pub fn validate_agent_id(agent_id: &str) -> Result<()> {
        Self::validate_non_empty("agent_id", agent_id)
    }

    /// `due_date` must carry explicit timezone information (B2). Because
    /// `chrono::DateTime<Utc>` can only be constructed from a string that
    /// already resolved an offset, the real enforcement point is the parse
    /// step upstream (see `parse_timestamp`); this re-validates intent when
    /// a `DateTime<Utc>` is handed in directly from an internal caller.
    pub fn validate_due_date(_due_date: &DateTime<Utc>) -> Result<()> {
        Ok(())
    }

    /// Parses an RFC3339 timestamp, rejecting inputs with no offset (B2).
    pub fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>> {
        if !(raw.ends_with('Z') || raw.contains('+') || raw[1..].contains('-')) {
            return Err(TaskError::validation(format!(
                "{field} must be an ISO-8601 timestamp with an explicit timezone"
            )));
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| TaskError::validation(format!("{field} is not a valid RFC3339 timestamp: {e}")))
    }

    /// `estimated_hours`/`actual_hours`: positive, at least 0.1, and
    /// representable at 0.1-hour precision (B3).
    pub fn validate_hours(field: &str, hours: f64) -> Result<()> {
        if hours < HOURS_MIN - f64::EPSILON {
            return Err(TaskError::validation(format!(
                "{field} must be >= {HOURS_MIN}, got {hours}"
            )));
        }
        let scaled = (hours * 10.0).round();
        if (scaled / 10.0 - hours).abs() > 1e-6 {
            return Err(TaskError::validation(format!(
                "{field} must have at most 0.1-hour precision, got {hours}"
            )));
        }
        Ok(())
    }

    /// Query/list `limit` bound (B4).
    pub fn validate_limit(limit: u32) -> Result<()> {
        if limit == 0 || limit > QUERY_LIMIT_MAX {
            return Err(TaskError::validation(format!(
                "limit must be between 1 and {QUERY_LIMIT_MAX}, got {limit}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_boundaries() {
        assert!(TaskValidator::validate_title(&"a".repeat(3)).is_ok());
        assert!(TaskValidator::validate_title(&"a".repeat(100)).is_ok());
        assert!(TaskValidator::validate_title(&"a".repeat(2)).is_err());
        assert!(TaskValidator::validate_title(&"a".repeat(101)).is_err());
    }

    #[test]
    fn due_date_requires_timezone() {
        assert!(TaskValidator::parse_timestamp("due_date", "2026-01-01T00:00:00Z").is_ok());
        assert!(TaskValidator::parse_timestamp("due_date", "2026-01-01T00:00:00+02:00").is_ok());
        assert!(TaskValidator::parse_timestamp("due_date", "2026-01-01T00:00:00").is_err());
    }

    #[test]
    fn hours_precision_boundaries() {
        assert!(TaskValidator::validate_hours("estimated_hours", 0.1).is_ok());
        assert!(TaskValidator::validate_hours("estimated_hours", 0.09).is_err());
        assert!(TaskValidator::validate_hours("estimated_hours", 2.5).is_ok());
        assert!(TaskValidator::validate_hours("estimated_hours", 2.55).is_err());
    }

    #[test]
    fn limit_boundaries() {
        assert!(TaskValidator::validate_limit(1000).is_ok());
        assert!(TaskValidator::validate_limit(1001).is_err());
        assert!(TaskValidator::validate_limit(0).is_err());
    }

    #[test]
    fn instruction_minimum_length() {
        assert!(TaskValidator::validate_instruction("task_instruction", "short").is_err());
        assert!(TaskValidator::validate_instruction("task_instruction", "long enough text").is_ok());
    }
}
