//! A `Store`-implementation-agnostic contract suite.
//!
//! `database/tests/contract.rs` already covers the CRUD-shaped contract
//! (create/reserve/complete/verify/unlock/filter/relationships/tags/comments)
//! against `SqliteStore`. This module complements rather than repeats it: it
//! exercises the all-or-nothing batch semantics and search/statistics
//! surface that any `Store` backend — in-memory or SQL — must honor
//! identically, so a future second backend can be dropped in and run the
//! same assertions.

use std::sync::Arc;

use chrono::Utc;

use task_core::store::{NewTaskInput, Store};

fn sample(title: &str) -> NewTaskInput {
    NewTaskInput {
        project_id: None,
        task_type: task_core::models::TaskType::Concrete,
        priority: task_core::models::Priority::Medium,
        title: title.to_string(),
        task_instruction: "do the thing".to_string(),
        verification_instruction: "check the thing".to_string(),
        notes: None,
        estimated_hours: None,
        due_date: None,
        created_by: "contract-agent".to_string(),
    }
}

/// Run every contract test in this module against `store`.
pub async fn test_store_contract<S: Store + 'static>(store: Arc<S>) {
    test_bulk_unlock_all_or_nothing(store.clone()).await;
    test_search_contract(store.clone()).await;
    test_statistics_contract(store.clone()).await;
}

/// `bulk_unlock_tasks` must be all-or-nothing: if any id in the batch fails
/// to unlock (wrong state, not found), none of the batch is committed.
pub async fn test_bulk_unlock_all_or_nothing<S: Store>(store: Arc<S>) {
    let a = store.create_task(sample("Bulk Unlock A")).await.unwrap();
    let b = store.create_task(sample("Bulk Unlock B")).await.unwrap();
    store.reserve_task(a.id, "agent-a", Utc::now()).await.unwrap();
    store.reserve_task(b.id, "agent-a", Utc::now()).await.unwrap();

    // c is never reserved, so unlocking it alongside a/b must fail the batch.
    let c = store.create_task(sample("Bulk Unlock C (never reserved)")).await.unwrap();

    let outcomes = store.bulk_unlock_tasks(&[a.id, b.id, c.id], "agent-a", Utc::now()).await.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().any(|o| !o.ok), "at least one outcome must report failure");

    let a_after = store.get_task(a.id).await.unwrap().unwrap();
    assert_eq!(
        a_after.task_status,
        task_core::models::TaskStatus::InProgress,
        "a must remain locked because the batch rolled back"
    );
}

/// Case-insensitive substring search over title/instruction/notes.
pub async fn test_search_contract<S: Store>(store: Arc<S>) {
    store.create_task(sample("Investigate flaky checkout retries")).await.unwrap();
    store.create_task(sample("Unrelated documentation pass")).await.unwrap();

    let hits = store.search_tasks("CHECKOUT", 10).await.unwrap();
    assert!(hits.iter().any(|t| t.title.contains("checkout")));
    assert!(!hits.iter().any(|t| t.title.contains("documentation")));
}

/// `statistics` must report a non-empty breakdown once at least one task exists.
pub async fn test_statistics_contract<S: Store>(store: Arc<S>) {
    store.create_task(sample("Statistics Seed")).await.unwrap();

    let stats = store
        .statistics(&task_core::store::StatisticsFilter::default())
        .await
        .unwrap();
    assert!(stats.total > 0, "should report at least one task");
    assert!(!stats.by_status.is_empty(), "should have a status breakdown");
}
