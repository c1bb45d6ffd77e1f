//! Domain entities for the task coordination service.
//!
//! Every entity here is a plain, serde-friendly struct mirroring the shape
//! persisted by the store. Enums carry `Display`/`FromStr` conversions so
//! both SQL layers and the tool-call protocol can exchange them as strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant-like grouping for tasks. Immutable after create except `description`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub local_path_hint: Option<String>,
    pub origin_url: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Coarse classification of a task's shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Concrete,
    Abstract,
    Epic,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskType::Concrete => "concrete",
            TaskType::Abstract => "abstract",
            TaskType::Epic => "epic",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concrete" => Ok(TaskType::Concrete),
            "abstract" => Ok(TaskType::Abstract),
            "epic" => Ok(TaskType::Epic),
            other => Err(format!("unknown task_type: {other}")),
        }
    }
}

/// Scheduling priority. Ordering descending: critical > high > medium > low.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Priority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Primary lifecycle status of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Available,
    InProgress,
    Complete,
    Blocked,
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Available => "available",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Complete => "complete",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(TaskStatus::Available),
            "in_progress" => Ok(TaskStatus::InProgress),
            "complete" => Ok(TaskStatus::Complete),
            "blocked" => Ok(TaskStatus::Blocked),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task_status: {other}")),
        }
    }
}

/// Secondary verification sub-state, meaningful only once `task_status = complete`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Verified,
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerificationStatus::Unverified => "unverified",
            VerificationStatus::Verified => "verified",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(VerificationStatus::Unverified),
            "verified" => Ok(VerificationStatus::Verified),
            other => Err(format!("unknown verification_status: {other}")),
        }
    }
}

/// A unit of work tracked by the coordination service.
///
/// Invariant: `task_status = in_progress` iff both `assigned_agent` and
/// `assigned_at` are set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub project_id: Option<i64>,
    pub task_type: TaskType,
    pub priority: Priority,
    pub title: String,
    pub task_instruction: String,
    pub verification_instruction: String,
    pub notes: Option<String>,
    pub assigned_agent: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub task_status: TaskStatus,
    pub verification_status: VerificationStatus,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub github_issue_url: Option<String>,
    pub github_pr_url: Option<String>,
}

impl Task {
    /// Whether `new_status` is a legal move from the current `task_status`.
    ///
    /// `available -> in_progress -> complete`, with side transitions
    /// `in_progress -> available` (unlock), `available/in_progress -> blocked`,
    /// and `* -> cancelled` (terminal; no reopen path in this implementation).
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self.task_status, new_status),
            (Available, InProgress)
                | (Available, Blocked)
                | (Available, Cancelled)
                | (InProgress, Available)
                | (InProgress, Blocked)
                | (InProgress, Complete)
                | (InProgress, Cancelled)
                | (Blocked, Available)
                | (Blocked, Cancelled)
        )
    }
}

/// Directed edge between two tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Subtask,
    Blocking,
    BlockedBy,
    Followup,
    Related,
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelationshipType::Subtask => "subtask",
            RelationshipType::Blocking => "blocking",
            RelationshipType::BlockedBy => "blocked_by",
            RelationshipType::Followup => "followup",
            RelationshipType::Related => "related",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subtask" => Ok(RelationshipType::Subtask),
            "blocking" => Ok(RelationshipType::Blocking),
            "blocked_by" => Ok(RelationshipType::BlockedBy),
            "followup" => Ok(RelationshipType::Followup),
            "related" => Ok(RelationshipType::Related),
            other => Err(format!("unknown relationship_type: {other}")),
        }
    }
}

impl RelationshipType {
    /// Edge types the Dependency Resolver and cycle guard consider.
    pub fn is_dependency_edge(self) -> bool {
        matches!(
            self,
            RelationshipType::Subtask | RelationshipType::Blocking | RelationshipType::BlockedBy
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub id: i64,
    pub parent_task_id: i64,
    pub child_task_id: i64,
    pub relationship_type: RelationshipType,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskTag {
    pub task_id: i64,
    pub tag_id: i64,
}

/// Kind of narrative entry an agent leaves on a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    Progress,
    Note,
    Blocker,
    Question,
    Finding,
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpdateType::Progress => "progress",
            UpdateType::Note => "note",
            UpdateType::Blocker => "blocker",
            UpdateType::Question => "question",
            UpdateType::Finding => "finding",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UpdateType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "progress" => Ok(UpdateType::Progress),
            "note" => Ok(UpdateType::Note),
            "blocker" => Ok(UpdateType::Blocker),
            "question" => Ok(UpdateType::Question),
            "finding" => Ok(UpdateType::Finding),
            other => Err(format!("unknown update_type: {other}")),
        }
    }
}

/// Agent-authored, immutable narrative entry on a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Update {
    pub id: i64,
    pub task_id: i64,
    pub agent_id: String,
    pub update_type: UpdateType,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// One append-only audit record per mutated field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEntry {
    pub id: i64,
    pub task_id: i64,
    pub agent_id: String,
    pub change_type: String,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Full snapshot of a task's persistent fields after a structural change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskVersion {
    pub task_id: i64,
    pub version_number: i64,
    pub snapshot: Task,
    pub created_at: DateTime<Utc>,
}

/// One field-level difference between two versions of the same task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDiff {
    pub field: String,
    pub v1_value: Option<String>,
    pub v2_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub task_id: i64,
    pub agent_id: String,
    pub content: String,
    pub parent_comment_id: Option<i64>,
    pub mentions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Outcome of a single reservation attempt attached to a successful `reserve`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaleWarning {
    pub previous_agent: String,
    pub unlocked_at: DateTime<Utc>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_task(status: TaskStatus) -> Task {
        Task {
            id: 1,
            project_id: None,
            task_type: TaskType::Concrete,
            priority: Priority::Medium,
            title: "t".into(),
            task_instruction: "do the thing".into(),
            verification_instruction: "check the thing".into(),
            notes: None,
            assigned_agent: None,
            assigned_at: None,
            task_status: status,
            verification_status: VerificationStatus::Unverified,
            estimated_hours: None,
            actual_hours: None,
            due_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
            github_issue_url: None,
            github_pr_url: None,
        }
    }

    #[test]
    fn available_to_in_progress_allowed() {
        assert!(base_task(TaskStatus::Available).can_transition_to(TaskStatus::InProgress));
    }

    #[test]
    fn complete_is_terminal_except_via_verify_substate() {
        let t = base_task(TaskStatus::Complete);
        assert!(!t.can_transition_to(TaskStatus::Available));
        assert!(!t.can_transition_to(TaskStatus::InProgress));
        assert!(!t.can_transition_to(TaskStatus::Cancelled));
    }

    #[test]
    fn cancelled_is_terminal() {
        let t = base_task(TaskStatus::Cancelled);
        for s in [
            TaskStatus::Available,
            TaskStatus::InProgress,
            TaskStatus::Complete,
            TaskStatus::Blocked,
        ] {
            assert!(!t.can_transition_to(s));
        }
    }

    #[test]
    fn any_active_status_can_cancel() {
        assert!(base_task(TaskStatus::Available).can_transition_to(TaskStatus::Cancelled));
        assert!(base_task(TaskStatus::InProgress).can_transition_to(TaskStatus::Cancelled));
        assert!(base_task(TaskStatus::Blocked).can_transition_to(TaskStatus::Cancelled));
    }

    #[test]
    fn priority_orders_descending() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn round_trip_display_from_str() {
        assert_eq!("available".parse::<TaskStatus>().unwrap().to_string(), "available");
        assert_eq!(
            "blocked_by".parse::<RelationshipType>().unwrap().to_string(),
            "blocked_by"
        );
    }
}
