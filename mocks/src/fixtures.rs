//! Standard test fixtures for consistent testing.
//!
//! Provides pre-built test data including:
//! - Standard tasks in various states
//! - Edge case scenarios
//! - Bulk task generators

use chrono::Utc;

use task_core::models::{Priority, Task, TaskStatus, TaskType, VerificationStatus};
use task_core::store::NewTaskInput;

use crate::builders::{NewTaskInputBuilder, TaskBuilder};

/// Create a basic test task with sensible defaults.
pub fn create_test_task() -> Task {
    TaskBuilder::new().with_title("Standard Test Task").build()
}

/// Create a task with a specific status, with the side-effect fields
/// (`assigned_agent`/`assigned_at`/`completed_at`) wired up consistently.
pub fn create_test_task_with_status(status: TaskStatus) -> Task {
    TaskBuilder::new().with_title("Standard Test Task").with_status(status).build()
}

/// Create a task assigned to a specific agent.
pub fn create_test_task_with_agent(agent_id: &str) -> Task {
    TaskBuilder::new().with_status(TaskStatus::InProgress).with_assigned_agent(agent_id).build()
}

/// Create multiple unique tasks, distributed across both status and agent.
pub fn create_test_tasks(count: usize) -> Vec<Task> {
    let statuses = [TaskStatus::Available, TaskStatus::InProgress, TaskStatus::Complete, TaskStatus::Blocked];
    (1..=count)
        .map(|i| {
            let status = statuses[i % statuses.len()];
            let mut builder =
                TaskBuilder::new().with_id(i as i64).with_title(format!("Test Task {i}"));
            builder = if status == TaskStatus::InProgress || status == TaskStatus::Complete {
                builder.with_status(status).with_assigned_agent(format!("agent-{}", i % 3 + 1))
            } else {
                builder.with_status(status)
            };
            builder.build()
        })
        .collect()
}

/// Create one task in each reachable `TaskStatus`.
pub fn create_tasks_in_all_statuses() -> Vec<Task> {
    let now = Utc::now();
    vec![
        TaskBuilder::new().with_id(1).with_title("Available Task").with_status(TaskStatus::Available).build(),
        TaskBuilder::new()
            .with_id(2)
            .with_title("In-Progress Task")
            .with_status(TaskStatus::InProgress)
            .with_assigned_agent("test-agent")
            .build(),
        TaskBuilder::new().with_id(3).with_title("Blocked Task").with_status(TaskStatus::Blocked).build(),
        {
            let mut t = TaskBuilder::new()
                .with_id(4)
                .with_title("Complete Task")
                .with_status(TaskStatus::Complete)
                .with_assigned_agent("test-agent")
                .build();
            t.completed_at = Some(now);
            t.verification_status = VerificationStatus::Verified;
            t
        },
        TaskBuilder::new()
            .with_id(5)
            .with_title("Cancelled Task")
            .with_status(TaskStatus::Cancelled)
            .build(),
    ]
}

/// A standard `NewTaskInput` for exercising `Store::create_task`.
pub fn create_new_task_input() -> NewTaskInput {
    NewTaskInputBuilder::new().with_title("New Test Task").build()
}

/// A `NewTaskInput` with a specific priority.
pub fn create_new_task_input_with_priority(priority: Priority) -> NewTaskInput {
    NewTaskInputBuilder::new().with_title("New Test Task").with_priority(priority).build()
}

/// A `NewTaskInput` describing an abstract (non-concrete) task.
pub fn create_abstract_task_input() -> NewTaskInput {
    NewTaskInputBuilder::new()
        .with_title("Design the approach")
        .with_task_type(TaskType::Abstract)
        .build()
}
