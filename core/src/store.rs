//! The `Store` trait: durable, transactional persistence for every entity
//! in the data model, plus the composite-indexed scans the Query Engine and
//! Dependency Resolver need.
//!
//! Mutations that touch a `Task`'s persistent fields are expressed as the
//! few concurrency-sensitive operations below (`reserve_task`,
//! `complete_task`, `unlock_task`, `bulk_unlock_tasks`, `verify_task`,
//! `cancel_task`, `create_task`, `link_github_issue`, `link_github_pr`) rather than a
//! single generic "update" — each one knows exactly which fields it
//! touches and their prior values, so it can append the Change Log and
//! Version Log entries atomically with the write (invariant 5) without a
//! separate read-modify-write race window. Implementations MUST perform
//! the entity write, its ChangeEntry row(s), and its TaskVersion row in one
//! transaction: either all persist or none do.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    ChangeEntry, Comment, Priority, Project, Relationship, RelationshipType, Tag, Task,
    TaskStatus, TaskType, TaskVersion, Update, UpdateType,
};

#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub local_path_hint: Option<String>,
    pub origin_url: Option<String>,
    pub description: Option<String>,
}

/// Fields supplied to `create_task`. Every field here becomes one
/// ChangeEntry (old_value = None) plus the task's version-1 snapshot.
#[derive(Debug, Clone)]
pub struct NewTaskInput {
    pub project_id: Option<i64>,
    pub task_type: TaskType,
    pub priority: Priority,
    pub title: String,
    pub task_instruction: String,
    pub verification_instruction: String,
    pub notes: Option<String>,
    pub estimated_hours: Option<f64>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_by: String,
}

/// Structured, composable filter shared by `query`/`summary`/`list_available`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<i64>,
    pub task_type: Option<TaskType>,
    pub task_status: Option<TaskStatus>,
    pub assigned_agent: Option<String>,
    pub priority: Option<Priority>,
    pub tag_id: Option<i64>,
    pub tag_ids: Option<Vec<i64>>,
    /// `IN (...)` restriction used where a single `task_type` can't express
    /// the wanted set (e.g. the breakdown agent's `{abstract, epic}`
    /// projection). Combined with `task_type` by AND when both are set.
    pub task_types: Option<Vec<TaskType>>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub completed_after: Option<DateTime<Utc>>,
    pub completed_before: Option<DateTime<Utc>>,
    pub order_by: Option<OrderBy>,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    PriorityDesc,
    PriorityAsc,
    CreatedAtAsc,
    CreatedAtDesc,
}

/// Lightweight projection used by `summary`/`recent_completions`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskSummary {
    pub id: i64,
    pub title: String,
    pub task_type: TaskType,
    pub task_status: TaskStatus,
    pub assigned_agent: Option<String>,
    pub project_id: Option<i64>,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskSummary {
    fn from(t: &Task) -> Self {
        TaskSummary {
            id: t.id,
            title: t.title.clone(),
            task_type: t.task_type,
            task_status: t.task_status,
            assigned_agent: t.assigned_agent.clone(),
            project_id: t.project_id,
            priority: t.priority,
            created_at: t.created_at,
            updated_at: t.updated_at,
            completed_at: t.completed_at,
        }
    }
}

/// Outcome of one id inside a `bulk_unlock_tasks` batch. All-or-nothing:
/// when any entry fails, every entry in the batch is reported as failed
/// with `committed = false` and the store is left unchanged.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkUnlockOutcome {
    pub task_id: i64,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeEntryFilter {
    pub task_id: Option<i64>,
    pub agent_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: u32,
}

/// Merged, chronologically ordered feed entry for `activity_feed`.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityEntry {
    Change(ChangeEntry),
    Update(Update),
}

impl ActivityEntry {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            ActivityEntry::Change(c) => c.created_at,
            ActivityEntry::Update(u) => u.created_at,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            ActivityEntry::Change(c) => c.id,
            ActivityEntry::Update(u) => u.id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFeedFilter {
    pub task_id: Option<i64>,
    pub agent_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: u32,
}

#[derive(Debug, Clone, Default)]
pub struct StatisticsFilter {
    pub project_id: Option<i64>,
    pub task_type: Option<TaskType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, serde::Serialize, Default)]
pub struct Statistics {
    pub total: u64,
    pub by_status: std::collections::HashMap<String, u64>,
    pub by_type: std::collections::HashMap<String, u64>,
    pub by_project: std::collections::HashMap<String, u64>,
    pub completion_rate: f64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<()>;

    // ---- Projects -----------------------------------------------------
    async fn create_project(&self, new: NewProject) -> Result<Project>;
    async fn get_project(&self, id: i64) -> Result<Option<Project>>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn update_project_description(&self, id: i64, description: Option<String>) -> Result<Project>;

    // ---- Tasks: mutation entry points (each one atomic with audit) ----
    async fn create_task(&self, input: NewTaskInput) -> Result<Task>;

    /// Atomic CAS: succeeds only if the task is `available` and not
    /// effectively blocked at the instant of the write. The blocked check
    /// must be evaluated inside the same transaction as the status flip
    /// (see the `database` crate for the correlated-subquery implementation)
    /// so a relationship created between a caller's prior check and this
    /// write can't slip an effectively-blocked task through.
    async fn reserve_task(&self, task_id: i64, agent_id: &str, now: DateTime<Utc>) -> Result<Task>;

    async fn complete_task(
        &self,
        task_id: i64,
        agent_id: &str,
        notes: Option<String>,
        actual_hours: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<(Task, bool)>; // bool = true when this call performed verification, not first completion

    async fn verify_task(&self, task_id: i64, agent_id: &str, now: DateTime<Utc>) -> Result<Task>;

    async fn unlock_task(
        &self,
        task_id: i64,
        actor_id: &str,
        expected_agent: &str,
        reason_note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Task>;

    async fn bulk_unlock_tasks(
        &self,
        task_ids: &[i64],
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<BulkUnlockOutcome>>;

    async fn link_github_issue(&self, task_id: i64, agent_id: &str, url: String) -> Result<Task>;
    async fn link_github_pr(&self, task_id: i64, agent_id: &str, url: String) -> Result<Task>;

    /// Atomic CAS: moves the task to `cancelled` from any status except
    /// `complete`/`cancelled` (invariant 3 — a task can't be both complete
    /// and cancelled, and cancellation itself is terminal).
    async fn cancel_task(
        &self,
        task_id: i64,
        agent_id: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Task>;

    // ---- Tasks: reads ---------------------------------------------------
    async fn get_task(&self, id: i64) -> Result<Option<Task>>;
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;
    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64>;
    async fn search_tasks(&self, query: &str, limit: u32) -> Result<Vec<Task>>;
    async fn statistics(&self, filter: &StatisticsFilter) -> Result<Statistics>;

    // ---- Updates --------------------------------------------------------
    async fn add_update(
        &self,
        task_id: i64,
        agent_id: &str,
        update_type: UpdateType,
        content: String,
        metadata: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<Update>;
    async fn list_updates(&self, task_id: i64) -> Result<Vec<Update>>;
    async fn latest_finding_update(&self, task_id: i64) -> Result<Option<Update>>;

    // ---- Change log / versions -------------------------------------------
    async fn list_change_entries(&self, filter: &ChangeEntryFilter) -> Result<Vec<ChangeEntry>>;
    async fn list_versions(&self, task_id: i64) -> Result<Vec<TaskVersion>>;
    async fn get_version(&self, task_id: i64, version_number: i64) -> Result<Option<TaskVersion>>;
    async fn latest_version(&self, task_id: i64) -> Result<Option<TaskVersion>>;

    async fn activity_feed(&self, filter: &ActivityFeedFilter) -> Result<Vec<ActivityEntry>>;

    // ---- Relationships ----------------------------------------------------
    /// Inserts the edge. Implementations enforce the uniqueness rule (at
    /// most one edge of a given type between an ordered pair) but do NOT
    /// enforce the cycle guard themselves — that is `task-core::dependency`'s
    /// job, evaluated against data fetched via the read methods below
    /// before this is called.
    async fn create_relationship(
        &self,
        parent_task_id: i64,
        child_task_id: i64,
        relationship_type: RelationshipType,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Relationship>;

    async fn relationships_touching(&self, task_ids: &[i64]) -> Result<Vec<Relationship>>;

    /// Batched lookup of `blocked_by`/`blocking` edges whose *other* end
    /// has not reached `complete` — one query regardless of `|task_ids|`.
    async fn direct_blockers(&self, task_ids: &[i64]) -> Result<Vec<(i64, Relationship, TaskStatus)>>;

    /// One breadth-first level of the `subtask` hierarchy: children of any
    /// id in `parent_ids`, with their current status. Used by the
    /// Dependency Resolver to walk level-by-level instead of recursing
    /// per task.
    async fn subtask_children(&self, parent_ids: &[i64]) -> Result<Vec<(i64, i64, TaskStatus)>>;

    // ---- Tags ---------------------------------------------------------
    async fn get_or_create_tag(&self, name: &str) -> Result<Tag>;
    async fn list_tags(&self) -> Result<Vec<Tag>>;
    async fn assign_tag(&self, task_id: i64, tag_id: i64) -> Result<()>;
    async fn remove_tag(&self, task_id: i64, tag_id: i64) -> Result<()>;
    async fn list_task_tags(&self, task_id: i64) -> Result<Vec<Tag>>;

    // ---- Comments -------------------------------------------------------
    async fn create_comment(
        &self,
        task_id: i64,
        agent_id: &str,
        content: String,
        parent_comment_id: Option<i64>,
        mentions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Comment>;
    async fn get_comment(&self, id: i64) -> Result<Option<Comment>>;
    async fn update_comment(&self, id: i64, agent_id: &str, content: String, now: DateTime<Utc>) -> Result<Comment>;
    async fn delete_comment(&self, id: i64, agent_id: &str) -> Result<()>;
    async fn list_comments(&self, task_id: i64) -> Result<Vec<Comment>>;
}
