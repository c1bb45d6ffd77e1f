//! Custom assertion helpers for testing.
//!
//! Provides specialized assertions for:
//! - Task equality with clear error messages
//! - Status transition validation
//! - Collection-based assertions

use task_core::models::{Task, TaskStatus};

/// Assert tasks are equal ignoring timestamps.
pub fn assert_task_equals(actual: &Task, expected: &Task) {
    assert_eq!(actual.id, expected.id, "Task IDs don't match");
    assert_eq!(actual.title, expected.title, "Task titles don't match");
    assert_eq!(actual.task_instruction, expected.task_instruction, "Task instructions don't match");
    assert_eq!(actual.assigned_agent, expected.assigned_agent, "Task assignees don't match");
    assert_eq!(actual.task_status, expected.task_status, "Task statuses don't match");
    assert_eq!(actual.verification_status, expected.verification_status, "Task verification statuses don't match");
}

/// Assert task matches partial criteria.
pub fn assert_task_matches(task: &Task, matcher: &TaskMatcher) {
    if let Some(expected_id) = matcher.id {
        assert_eq!(task.id, expected_id, "Task ID doesn't match expected");
    }
    if let Some(ref expected_title) = matcher.title {
        assert_eq!(&task.title, expected_title, "Task title doesn't match expected");
    }
    if let Some(ref expected_agent) = matcher.assigned_agent {
        assert_eq!(task.assigned_agent.as_ref(), Some(expected_agent), "Task assignee doesn't match expected");
    }
    if let Some(expected_status) = matcher.task_status {
        assert_eq!(task.task_status, expected_status, "Task status doesn't match expected");
    }
}

/// Assert status transition is valid according to the lifecycle's `can_transition_to`.
pub fn assert_transition_valid(from: TaskStatus, to: TaskStatus) {
    let task = crate::builders::TaskBuilder::new().with_status(from).build();
    assert!(
        task.can_transition_to(to),
        "expected transition from {from:?} to {to:?} to be valid, but it's not"
    );
}

/// Assert status transition is invalid according to the lifecycle's `can_transition_to`.
pub fn assert_transition_invalid(from: TaskStatus, to: TaskStatus) {
    let task = crate::builders::TaskBuilder::new().with_status(from).build();
    assert!(
        !task.can_transition_to(to),
        "expected transition from {from:?} to {to:?} to be invalid, but it's valid"
    );
}

/// Assert a task list contains a task with the given title.
pub fn assert_contains_task_titled(tasks: &[Task], title: &str) {
    assert!(
        tasks.iter().any(|t| t.title == title),
        "expected to find a task titled '{}', but it wasn't found. Available titles: {:?}",
        title,
        tasks.iter().map(|t| &t.title).collect::<Vec<_>>()
    );
}

/// Assert tasks are sorted by `created_at` descending (most recent first).
pub fn assert_tasks_sorted_by_created_at_desc(tasks: &[Task]) {
    for window in tasks.windows(2) {
        assert!(
            window[0].created_at >= window[1].created_at,
            "tasks are not sorted by created_at descending: '{}' ({}) comes before '{}' ({})",
            window[0].title,
            window[0].created_at,
            window[1].title,
            window[1].created_at
        );
    }
}

/// Flexible task matcher for partial assertions.
#[derive(Debug, Default)]
pub struct TaskMatcher {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub assigned_agent: Option<String>,
    pub task_status: Option<TaskStatus>,
}

impl TaskMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_assigned_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.assigned_agent = Some(agent_id.into());
        self
    }

    pub fn with_task_status(mut self, status: TaskStatus) -> Self {
        self.task_status = Some(status);
        self
    }
}
