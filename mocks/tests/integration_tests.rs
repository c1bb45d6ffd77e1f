//! Integration tests for the mocks crate.
//!
//! Exercises the fixtures/builders/generators/assertions against
//! `InMemoryStore`, the same `Store` implementation the rest of the
//! workspace uses in place of a real SQLite file.

use std::sync::Arc;

use mocks::contracts::test_store_contract;
use mocks::*;
use task_core::models::{Priority, TaskStatus};
use task_core::store::Store;

#[tokio::test]
async fn store_create_reserve_round_trips_through_the_real_store_trait() {
    let store = InMemoryStore::new();
    let input = create_new_task_input();
    let task = store.create_task(input).await.unwrap();

    assert_eq!(task.title, "New Test Task");
    assert_eq!(task.task_status, TaskStatus::Available);
}

#[tokio::test]
async fn fixtures_create_tasks_in_all_statuses_covers_every_status() {
    let tasks = create_tasks_in_all_statuses();
    assert_eq!(tasks.len(), 5);

    let statuses: Vec<_> = tasks.iter().map(|t| t.task_status).collect();
    assert!(statuses.contains(&TaskStatus::Available));
    assert!(statuses.contains(&TaskStatus::InProgress));
    assert!(statuses.contains(&TaskStatus::Blocked));
    assert!(statuses.contains(&TaskStatus::Complete));
    assert!(statuses.contains(&TaskStatus::Cancelled));

    let complete = tasks.iter().find(|t| t.task_status == TaskStatus::Complete).unwrap();
    assert!(complete.completed_at.is_some());
}

#[test]
fn builders_task_builder_sets_status_side_effects() {
    let task = TaskBuilder::new()
        .with_id(42)
        .with_title("Built Task")
        .with_status(TaskStatus::InProgress)
        .with_assigned_agent("builder-agent")
        .build();

    assert_eq!(task.id, 42);
    assert_eq!(task.title, "Built Task");
    assert_eq!(task.task_status, TaskStatus::InProgress);
    assert_eq!(task.assigned_agent.as_deref(), Some("builder-agent"));
    assert!(task.assigned_at.is_some());
}

#[test]
fn assertions_task_equals_detects_differences() {
    let task1 = create_test_task();
    let mut task2 = task1.clone();
    assert_task_equals(&task1, &task2);

    task2.title = "Different Title".to_string();
    let result = std::panic::catch_unwind(|| assert_task_equals(&task1, &task2));
    assert!(result.is_err());
}

#[test]
fn assertions_transitions_match_the_lifecycle_invariant() {
    assert_transition_valid(TaskStatus::Available, TaskStatus::InProgress);
    assert_transition_valid(TaskStatus::InProgress, TaskStatus::Complete);
    assert_transition_invalid(TaskStatus::Complete, TaskStatus::InProgress);
    assert_transition_invalid(TaskStatus::Cancelled, TaskStatus::Available);
}

#[test]
fn generators_produce_internally_consistent_tasks() {
    for _ in 0..20 {
        let task = generate_random_task();
        assert!(task.id > 0);
        assert!(!task.title.is_empty());
        match task.task_status {
            TaskStatus::InProgress | TaskStatus::Complete => assert!(task.assigned_agent.is_some()),
            _ => {}
        }
    }
}

#[tokio::test]
async fn concurrent_creates_against_the_same_store_get_unique_ids() {
    let store = Arc::new(InMemoryStore::new());
    let mut set = tokio::task::JoinSet::new();

    for i in 0..10 {
        let store = store.clone();
        set.spawn(async move {
            let input = NewTaskInputBuilder::new()
                .with_title(format!("Concurrent Task {i}"))
                .with_priority(Priority::High)
                .build();
            store.create_task(input).await.unwrap()
        });
    }

    let mut tasks = Vec::new();
    while let Some(result) = set.join_next().await {
        tasks.push(result.unwrap());
    }

    assert_eq!(tasks.len(), 10);
    let mut ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 10);
}

#[tokio::test]
async fn store_contract_suite_passes_against_in_memory_store() {
    let store = Arc::new(InMemoryStore::new());
    test_store_contract(store).await;
}
