use std::sync::Arc;

use chrono::Utc;
use task_core::models::{Priority, RelationshipType, TaskStatus, TaskType, VerificationStatus};
use task_core::store::{ChangeEntryFilter, NewTaskInput, Store, TaskFilter};

/// Contract tests every `Store` implementation must pass.
///
/// Exercised here against `SqliteStore` (see `sqlite_integration.rs`), kept
/// generic so a future second backend can run the identical suite.
#[allow(dead_code)]
pub async fn test_store_contract<S: Store + 'static>(store: Arc<S>) {
    test_health_check(store.clone()).await;
    test_create_task_contract(store.clone()).await;
    test_get_task_contract(store.clone()).await;
    test_reserve_and_complete_contract(store.clone()).await;
    test_unlock_contract(store.clone()).await;
    test_list_tasks_filters_contract(store.clone()).await;
    test_not_found_errors_contract(store.clone()).await;
    test_relationship_contract(store.clone()).await;
    test_tag_contract(store.clone()).await;
    test_comment_contract(store.clone()).await;
}

fn sample_task(title: &str) -> NewTaskInput {
    NewTaskInput {
        project_id: None,
        task_type: TaskType::Concrete,
        priority: Priority::Medium,
        title: title.to_string(),
        task_instruction: "do the thing".to_string(),
        verification_instruction: "check the thing".to_string(),
        notes: None,
        estimated_hours: None,
        due_date: None,
        created_by: "contract-agent".to_string(),
    }
}

async fn test_health_check<S: Store>(store: Arc<S>) {
    assert!(store.health_check().await.is_ok());
}

async fn test_create_task_contract<S: Store>(store: Arc<S>) {
    let created = store.create_task(sample_task("Contract Create Test")).await.unwrap();
    assert_eq!(created.title, "Contract Create Test");
    assert_eq!(created.task_status, TaskStatus::Available);
    assert_eq!(created.verification_status, VerificationStatus::Unverified);
    assert!(created.id > 0);
    assert!(created.assigned_agent.is_none());

    let versions = store.list_versions(created.id).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_number, 1);
}

async fn test_get_task_contract<S: Store>(store: Arc<S>) {
    let created = store.create_task(sample_task("Contract Get Test")).await.unwrap();

    let retrieved = store.get_task(created.id).await.unwrap();
    assert!(retrieved.is_some());
    assert_eq!(retrieved.unwrap().id, created.id);

    let missing = store.get_task(i64::MAX - 1).await.unwrap();
    assert!(missing.is_none());
}

async fn test_reserve_and_complete_contract<S: Store>(store: Arc<S>) {
    let task = store.create_task(sample_task("Contract Lifecycle Test")).await.unwrap();

    let reserved = store.reserve_task(task.id, "agent-a", Utc::now()).await.unwrap();
    assert_eq!(reserved.task_status, TaskStatus::InProgress);
    assert_eq!(reserved.assigned_agent.as_deref(), Some("agent-a"));

    // Wrong agent cannot complete someone else's reservation.
    let err = store
        .complete_task(task.id, "agent-b", None, None, Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NotAssigned");

    let (done, was_verify) = store
        .complete_task(task.id, "agent-a", Some("finished".into()), Some(2.0), Utc::now())
        .await
        .unwrap();
    assert!(!was_verify);
    assert_eq!(done.task_status, TaskStatus::Complete);
    assert_eq!(done.actual_hours, Some(2.0));

    let verified = store.verify_task(task.id, "agent-a", Utc::now()).await.unwrap();
    assert_eq!(verified.verification_status, VerificationStatus::Verified);

    let changes = store
        .list_change_entries(&ChangeEntryFilter { task_id: Some(task.id), ..Default::default() })
        .await
        .unwrap();
    assert!(changes.len() >= 3);
}

async fn test_unlock_contract<S: Store>(store: Arc<S>) {
    let task = store.create_task(sample_task("Contract Unlock Test")).await.unwrap();
    store.reserve_task(task.id, "agent-a", Utc::now()).await.unwrap();

    let unlocked = store
        .unlock_task(task.id, "admin-agent", "agent-a", Some("stuck".into()), Utc::now())
        .await
        .unwrap();
    assert_eq!(unlocked.task_status, TaskStatus::Available);
    assert!(unlocked.assigned_agent.is_none());

    // A second agent can now reserve it.
    let reserved = store.reserve_task(task.id, "agent-c", Utc::now()).await.unwrap();
    assert_eq!(reserved.assigned_agent.as_deref(), Some("agent-c"));
}

async fn test_list_tasks_filters_contract<S: Store>(store: Arc<S>) {
    let a = store.create_task(sample_task("Filter Available")).await.unwrap();
    let b = store.create_task(sample_task("Filter InProgress")).await.unwrap();
    store.reserve_task(b.id, "agent-a", Utc::now()).await.unwrap();

    let available = store
        .list_tasks(&TaskFilter { task_status: Some(TaskStatus::Available), limit: 100, ..Default::default() })
        .await
        .unwrap();
    assert!(available.iter().any(|t| t.id == a.id));
    assert!(!available.iter().any(|t| t.id == b.id));

    let in_progress = store
        .list_tasks(&TaskFilter { task_status: Some(TaskStatus::InProgress), limit: 100, ..Default::default() })
        .await
        .unwrap();
    assert!(in_progress.iter().any(|t| t.id == b.id));
}

async fn test_not_found_errors_contract<S: Store>(store: Arc<S>) {
    let missing_id = i64::MAX - 2;
    let err = store.reserve_task(missing_id, "agent-a", Utc::now()).await.unwrap_err();
    assert_eq!(err.kind(), "NotFound");

    let err = store.complete_task(missing_id, "agent-a", None, None, Utc::now()).await.unwrap_err();
    assert_eq!(err.kind(), "NotFound");
}

async fn test_relationship_contract<S: Store>(store: Arc<S>) {
    let parent = store.create_task(sample_task("Relationship Parent")).await.unwrap();
    let child = store.create_task(sample_task("Relationship Child")).await.unwrap();

    store
        .create_relationship(parent.id, child.id, RelationshipType::BlockedBy, "contract-agent", Utc::now())
        .await
        .unwrap();

    let blockers = store.direct_blockers(&[parent.id]).await.unwrap();
    assert!(blockers.iter().any(|(candidate, _, _)| *candidate == parent.id));

    let touching = store.relationships_touching(&[parent.id]).await.unwrap();
    assert_eq!(touching.len(), 1);
}

async fn test_tag_contract<S: Store>(store: Arc<S>) {
    let task = store.create_task(sample_task("Tag Test")).await.unwrap();
    let tag = store.get_or_create_tag("urgent").await.unwrap();
    let same_tag = store.get_or_create_tag("urgent").await.unwrap();
    assert_eq!(tag.id, same_tag.id);

    store.assign_tag(task.id, tag.id).await.unwrap();
    let tags = store.list_task_tags(task.id).await.unwrap();
    assert_eq!(tags.len(), 1);

    store.remove_tag(task.id, tag.id).await.unwrap();
    let tags = store.list_task_tags(task.id).await.unwrap();
    assert!(tags.is_empty());
}

async fn test_comment_contract<S: Store>(store: Arc<S>) {
    let task = store.create_task(sample_task("Comment Test")).await.unwrap();
    let comment = store
        .create_comment(task.id, "agent-a", "looks good".into(), None, vec!["agent-b".into()], Utc::now())
        .await
        .unwrap();
    assert_eq!(comment.content, "looks good");

    let updated = store.update_comment(comment.id, "agent-a", "looks great".into(), Utc::now()).await.unwrap();
    assert_eq!(updated.content, "looks great");

    let err = store.update_comment(comment.id, "agent-b", "hijack".into(), Utc::now()).await.unwrap_err();
    assert_eq!(err.kind(), "NotAssigned");

    store.delete_comment(comment.id, "agent-a").await.unwrap();
    assert!(store.get_comment(comment.id).await.unwrap().is_none());
}
