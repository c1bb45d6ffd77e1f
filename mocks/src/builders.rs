//! Fluent builders for constructing test data.
//!
//! Mirrors the teacher's `TaskBuilder`/`*FilterBuilder` shape: a struct
//! wrapping the real type, `with_*` setters that return `Self`, and `build()`
//! at the end — just filled in for `NewTaskInput`/`Task`/`TaskFilter`
//! instead of the teacher's own domain fields.

use chrono::{DateTime, Utc};

use task_core::models::{Priority, Task, TaskStatus, TaskType, VerificationStatus};
use task_core::store::{NewTaskInput, OrderBy, TaskFilter};

/// Builder for [`NewTaskInput`], the payload `Store::create_task` consumes.
pub struct NewTaskInputBuilder {
    input: NewTaskInput,
}

impl Default for NewTaskInputBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NewTaskInputBuilder {
    pub fn new() -> Self {
        Self {
            input: NewTaskInput {
                project_id: None,
                task_type: TaskType::Concrete,
                priority: Priority::Medium,
                title: "New Test Task".to_string(),
                task_instruction: "Implement the thing under test".to_string(),
                verification_instruction: "Run the suite and confirm it passes".to_string(),
                notes: None,
                estimated_hours: None,
                due_date: None,
                created_by: "test-agent".to_string(),
            },
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.input.title = title.into();
        self
    }

    pub fn with_project_id(mut self, project_id: i64) -> Self {
        self.input.project_id = Some(project_id);
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.input.task_type = task_type;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.input.priority = priority;
        self
    }

    pub fn with_created_by(mut self, agent_id: impl Into<String>) -> Self {
        self.input.created_by = agent_id.into();
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.input.due_date = Some(due_date);
        self
    }

    pub fn with_estimated_hours(mut self, hours: f64) -> Self {
        self.input.estimated_hours = Some(hours);
        self
    }

    pub fn build(self) -> NewTaskInput {
        self.input
    }
}

/// Builder for a full in-memory [`Task`] snapshot, for tests that assert
/// against a task without going through `Store::create_task`.
pub struct TaskBuilder {
    task: Task,
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: 1,
                project_id: None,
                task_type: TaskType::Concrete,
                priority: Priority::Medium,
                title: "Test Task".to_string(),
                task_instruction: "Implement the thing under test".to_string(),
                verification_instruction: "Run the suite and confirm it passes".to_string(),
                notes: None,
                assigned_agent: None,
                assigned_at: None,
                task_status: TaskStatus::Available,
                verification_status: VerificationStatus::Unverified,
                estimated_hours: None,
                actual_hours: None,
                due_date: None,
                created_at: now,
                updated_at: now,
                completed_at: None,
                github_issue_url: None,
                github_pr_url: None,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.task.title = title.into();
        self
    }

    /// Sets `task_status`, wiring up the `assigned_agent`/`assigned_at` and
    /// `completed_at` side effects the invariant in §3 requires so callers
    /// can't build an inconsistent fixture by accident.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.task_status = status;
        match status {
            TaskStatus::InProgress => {
                if self.task.assigned_agent.is_none() {
                    self.task.assigned_agent = Some("test-agent".to_string());
                }
                self.task.assigned_at.get_or_insert(Utc::now());
            }
            TaskStatus::Complete => {
                self.task.completed_at.get_or_insert(Utc::now());
            }
            _ => {
                self.task.assigned_agent = None;
                self.task.assigned_at = None;
            }
        }
        self
    }

    pub fn with_assigned_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.task.assigned_agent = Some(agent_id.into());
        self.task.assigned_at.get_or_insert(Utc::now());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_project_id(mut self, project_id: i64) -> Self {
        self.task.project_id = Some(project_id);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Builder for [`TaskFilter`], the `query()`/`summary()` filter shape.
pub struct TaskFilterBuilder {
    filter: TaskFilter,
}

impl Default for TaskFilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskFilterBuilder {
    pub fn new() -> Self {
        Self { filter: TaskFilter::default() }
    }

    pub fn with_project_id(mut self, project_id: i64) -> Self {
        self.filter.project_id = Some(project_id);
        self
    }

    pub fn with_task_status(mut self, status: TaskStatus) -> Self {
        self.filter.task_status = Some(status);
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.filter.task_type = Some(task_type);
        self
    }

    pub fn with_assigned_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.filter.assigned_agent = Some(agent_id.into());
        self
    }

    pub fn with_order_by(mut self, order_by: OrderBy) -> Self {
        self.filter.order_by = Some(order_by);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.filter.limit = limit;
        self
    }

    pub fn build(self) -> TaskFilter {
        self.filter
    }
}
