//! Tool parameter DTOs for the agent-facing protocol.
//!
//! One struct per tool name in the dispatcher's method table. Every struct
//! derives `Deserialize` with `deny_unknown_fields` so the dispatcher rejects
//! stray keys instead of silently ignoring them. Conversions into the
//! `task-core` types that actually perform the operation live alongside each
//! struct so `mcp-protocol::dispatcher` stays a thin `match` over these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskError};
use crate::models::{Priority, RelationshipType, Task, TaskType, UpdateType};
use crate::store::{OrderBy, StatisticsFilter, TaskFilter};
use crate::validation::TaskValidator;

fn parse_opt_timestamp(field: &str, raw: &Option<String>) -> Result<Option<DateTime<Utc>>> {
    match raw {
        Some(s) => Ok(Some(TaskValidator::parse_timestamp(field, s)?)),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FollowupParams {
    pub title: String,
    pub task_type: TaskType,
    pub task_instruction: String,
    pub verification_instruction: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTaskParams {
    pub title: String,
    pub task_type: TaskType,
    pub task_instruction: String,
    pub verification_instruction: String,
    pub agent_id: String,
    pub project_id: Option<i64>,
    pub parent_task_id: Option<i64>,
    pub relationship_type: Option<RelationshipType>,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub notes: Option<String>,
    pub estimated_hours: Option<f64>,
    pub due_date: Option<String>,
}

impl CreateTaskParams {
    pub fn parsed_due_date(&self) -> Result<Option<DateTime<Utc>>> {
        parse_opt_timestamp("due_date", &self.due_date)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReserveTaskParams {
    pub task_id: i64,
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompleteTaskParams {
    pub task_id: i64,
    pub agent_id: String,
    pub notes: Option<String>,
    pub actual_hours: Option<f64>,
    pub followup: Option<FollowupParams>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyTaskParams {
    pub task_id: i64,
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnlockTaskParams {
    pub task_id: i64,
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkUnlockTasksParams {
    pub task_ids: Vec<i64>,
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelTaskParams {
    pub task_id: i64,
    pub agent_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddTaskUpdateParams {
    pub task_id: i64,
    pub agent_id: String,
    pub update_type: UpdateType,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
}

/// Agent-type projection used by `list_available_tasks`: `implementation`
/// sees only `concrete` tasks, `breakdown` sees `abstract`/`epic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTypeFilter {
    Implementation,
    Breakdown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListAvailableTasksParams {
    pub agent_type: AgentTypeFilter,
    pub project_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

impl ListAvailableTasksParams {
    /// Expresses the agent-type projection as a SQL-level `task_type IN
    /// (...)` restriction via `TaskFilter::task_types`, so the Query
    /// Engine's over-fetch-then-truncate never has to drop rows after the
    /// fact — every row the store returns already satisfies the projection.
    pub fn into_filter(self) -> TaskFilter {
        let task_type_restriction = match self.agent_type {
            AgentTypeFilter::Implementation => vec![TaskType::Concrete],
            AgentTypeFilter::Breakdown => vec![TaskType::Abstract, TaskType::Epic],
        };
        TaskFilter {
            project_id: self.project_id,
            task_types: Some(task_type_restriction),
            limit: self.limit,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct QueryTasksParams {
    pub project_id: Option<i64>,
    pub task_type: Option<TaskType>,
    pub task_status: Option<crate::models::TaskStatus>,
    pub agent_id: Option<String>,
    pub priority: Option<Priority>,
    pub tag_id: Option<i64>,
    pub tag_ids: Option<Vec<i64>>,
    pub order_by: Option<OrderByParam>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderByParam {
    PriorityDesc,
    PriorityAsc,
    CreatedAtAsc,
    CreatedAtDesc,
}

impl From<OrderByParam> for OrderBy {
    fn from(p: OrderByParam) -> Self {
        match p {
            OrderByParam::PriorityDesc => OrderBy::PriorityDesc,
            OrderByParam::PriorityAsc => OrderBy::PriorityAsc,
            OrderByParam::CreatedAtAsc => OrderBy::CreatedAtAsc,
            OrderByParam::CreatedAtDesc => OrderBy::CreatedAtDesc,
        }
    }
}

impl QueryTasksParams {
    pub fn into_filter(self) -> TaskFilter {
        TaskFilter {
            project_id: self.project_id,
            task_type: self.task_type,
            task_status: self.task_status,
            assigned_agent: self.agent_id,
            priority: self.priority,
            tag_id: self.tag_id,
            tag_ids: self.tag_ids,
            order_by: self.order_by.map(Into::into),
            limit: self.limit,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryStaleTasksParams {
    pub hours: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct GetTaskStatisticsParams {
    pub project_id: Option<i64>,
    pub task_type: Option<TaskType>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl GetTaskStatisticsParams {
    pub fn into_filter(self) -> Result<StatisticsFilter> {
        Ok(StatisticsFilter {
            project_id: self.project_id,
            task_type: self.task_type,
            start_date: parse_opt_timestamp("start_date", &self.start_date)?,
            end_date: parse_opt_timestamp("end_date", &self.end_date)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetRecentCompletionsParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub project_id: Option<i64>,
    pub hours: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct GetTaskSummaryParams {
    pub project_id: Option<i64>,
    pub task_type: Option<TaskType>,
    pub task_status: Option<crate::models::TaskStatus>,
    pub agent_id: Option<String>,
    pub priority: Option<Priority>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

impl GetTaskSummaryParams {
    pub fn into_filter(self) -> TaskFilter {
        TaskFilter {
            project_id: self.project_id,
            task_type: self.task_type,
            task_status: self.task_status,
            assigned_agent: self.agent_id,
            priority: self.priority,
            limit: self.limit,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchTasksParams {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetTasksApproachingDeadlineParams {
    #[serde(default = "default_days_ahead")]
    pub days_ahead: i64,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_days_ahead() -> i64 {
    3
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetTaskContextParams {
    pub task_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskContext {
    pub task: Task,
    pub project: Option<crate::models::Project>,
    pub ancestry: Vec<Task>,
    pub updates: Vec<crate::models::Update>,
    pub recent_changes: Vec<crate::models::ChangeEntry>,
    pub stale_warning: Option<crate::models::StaleWarning>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetAgentPerformanceParams {
    pub agent_id: String,
    pub task_type: Option<TaskType>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct AgentPerformance {
    pub agent_id: String,
    pub completed_count: u64,
    pub mean_actual_hours: f64,
    pub success_rate: f64,
    pub by_type: std::collections::HashMap<String, u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetActivityFeedParams {
    pub task_id: Option<i64>,
    pub agent_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    #[serde(default = "default_activity_limit")]
    pub limit: u32,
}

fn default_activity_limit() -> u32 {
    1000
}

impl GetActivityFeedParams {
    pub fn into_filter(self) -> Result<crate::store::ActivityFeedFilter> {
        Ok(crate::store::ActivityFeedFilter {
            task_id: self.task_id,
            agent_id: self.agent_id,
            start: parse_opt_timestamp("start", &self.start)?,
            end: parse_opt_timestamp("end", &self.end)?,
            limit: self.limit,
        })
    }
}

// ---- Tags ---------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTagParams {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignTaskTagParams {
    pub task_id: i64,
    pub tag_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveTaskTagParams {
    pub task_id: i64,
    pub tag_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetTaskTagsParams {
    pub task_id: i64,
}

// ---- Comments -------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentParams {
    pub task_id: i64,
    pub agent_id: String,
    pub content: String,
    pub parent_comment_id: Option<i64>,
    #[serde(default)]
    pub mentions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetCommentParams {
    pub comment_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCommentParams {
    pub comment_id: i64,
    pub agent_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteCommentParams {
    pub comment_id: i64,
    pub agent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListCommentsParams {
    pub task_id: i64,
}

// ---- Version log ----------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetTaskVersionsParams {
    pub task_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetTaskVersionParams {
    pub task_id: i64,
    pub version_number: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetLatestTaskVersionParams {
    pub task_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiffTaskVersionsParams {
    pub task_id: i64,
    pub v1: i64,
    pub v2: i64,
}

// ---- GitHub links -----------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkGithubIssueParams {
    pub task_id: i64,
    pub agent_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkGithubPrParams {
    pub task_id: i64,
    pub agent_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetGithubLinksParams {
    pub task_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GithubLinks {
    pub github_issue_url: Option<String>,
    pub github_pr_url: Option<String>,
}

pub fn validate_github_url(field: &str, url: &str) -> Result<()> {
    if !(url.starts_with("https://github.com/") || url.starts_with("http://github.com/")) {
        return Err(TaskError::validation(format!(
            "{field} must be a github.com URL, got {url}"
        )));
    }
    Ok(())
}

// ---- Projects ---------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateProjectParams {
    pub name: String,
    pub local_path_hint: Option<String>,
    pub origin_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetProjectParams {
    pub project_id: i64,
}

/// Health status response for agent-facing diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub database: bool,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "unknown".to_string(),
            database: false,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_field_is_rejected() {
        let raw = serde_json::json!({
            "task_id": 1,
            "agent_id": "a1",
            "bogus_extra_field": true
        });
        let result: std::result::Result<ReserveTaskParams, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }

    #[test]
    fn list_available_implementation_restricts_to_concrete() {
        let params = ListAvailableTasksParams {
            agent_type: AgentTypeFilter::Implementation,
            project_id: None,
            limit: 10,
        };
        let filter = params.into_filter();
        assert_eq!(filter.task_types, Some(vec![TaskType::Concrete]));
    }

    #[test]
    fn list_available_breakdown_restricts_to_abstract_and_epic() {
        let params = ListAvailableTasksParams {
            agent_type: AgentTypeFilter::Breakdown,
            project_id: None,
            limit: 10,
        };
        let filter = params.into_filter();
        assert_eq!(filter.task_types, Some(vec![TaskType::Abstract, TaskType::Epic]));
    }

    #[test]
    fn github_url_validation_rejects_non_github_hosts() {
        assert!(validate_github_url("url", "https://gitlab.com/x/y/issues/1").is_err());
        assert!(validate_github_url("url", "https://github.com/x/y/issues/1").is_ok());
    }
}
