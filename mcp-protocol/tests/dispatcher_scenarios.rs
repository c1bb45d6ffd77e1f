//! End-to-end scenarios driven entirely through `{method, params}` JSON, the
//! same surface an agent transport hands to `Dispatcher::dispatch`.

use std::sync::Arc;

use mcp_protocol::Dispatcher;
use mocks::InMemoryStore;
use serde_json::json;
use task_core::events::NullEventPublisher;
use task_core::lifecycle::LifecycleEngine;
use task_core::query::QueryEngine;
use task_core::store::Store;

fn dispatcher() -> Dispatcher {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let lifecycle = Arc::new(LifecycleEngine::new(store.clone(), Arc::new(NullEventPublisher), 3));
    let query = Arc::new(QueryEngine::new(store.clone()));
    Dispatcher::new(lifecycle, query, store)
}

async fn create(d: &Dispatcher, title: &str, agent: &str) -> i64 {
    let res = d
        .dispatch(
            "create_task",
            json!({
                "title": title,
                "task_type": "concrete",
                "task_instruction": "do the thing thoroughly",
                "verification_instruction": "check the thing works",
                "agent_id": agent,
                "project_id": null,
                "parent_task_id": null,
                "relationship_type": null,
                "priority": null,
                "notes": null,
                "estimated_hours": null,
                "due_date": null,
            }),
        )
        .await
        .unwrap();
    res["task"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn happy_path_create_reserve_complete_verify() {
    let d = dispatcher();
    let task_id = create(&d, "Impl payment path", "a1").await;

    let available = d
        .dispatch("list_available_tasks", json!({"agent_type": "implementation", "project_id": null, "limit": 10}))
        .await
        .unwrap();
    assert_eq!(available.as_array().unwrap().len(), 1);

    let reserved = d
        .dispatch("reserve_task", json!({"task_id": task_id, "agent_id": "a1"}))
        .await
        .unwrap();
    assert_eq!(reserved["task"]["task_status"], "in_progress");
    assert!(reserved["stale_warning"].is_null());

    d.dispatch(
        "add_task_update",
        json!({"task_id": task_id, "agent_id": "a1", "content": "started", "update_type": "progress", "metadata": null}),
    )
    .await
    .unwrap();

    let completed = d
        .dispatch(
            "complete_task",
            json!({"task_id": task_id, "agent_id": "a1", "notes": "done", "actual_hours": 2.5, "followup": null}),
        )
        .await
        .unwrap();
    assert_eq!(completed["task"]["task_status"], "complete");

    let verified = d
        .dispatch("verify_task", json!({"task_id": task_id, "agent_id": "a2"}))
        .await
        .unwrap();
    assert_eq!(verified["verification_status"], "verified");

    let versions = d
        .dispatch("get_task_versions", json!({"task_id": task_id}))
        .await
        .unwrap();
    assert_eq!(versions.as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn dependency_block_hides_task_until_blocker_completes() {
    let d = dispatcher();
    let b = create(&d, "Blocker", "agent").await;
    d.dispatch("reserve_task", json!({"task_id": b, "agent_id": "agent"}))
        .await
        .unwrap();

    // A is created already blocked_by B, which is still in_progress.
    let created = d
        .dispatch(
            "create_task",
            json!({
                "title": "Blocked task",
                "task_type": "concrete",
                "task_instruction": "depends on the blocker finishing first",
                "verification_instruction": "blocker must be complete",
                "agent_id": "agent",
                "project_id": null,
                "parent_task_id": b,
                "relationship_type": "blocked_by",
                "priority": null,
                "notes": null,
                "estimated_hours": null,
                "due_date": null,
            }),
        )
        .await
        .unwrap();
    let a = created["task"]["id"].as_i64().unwrap();

    let query_available = || {
        json!({"project_id": null, "task_type": null, "task_status": "available", "agent_id": null, "priority": null, "tag_id": null, "tag_ids": null, "order_by": null, "limit": 100})
    };

    let before = d.dispatch("query_tasks", query_available()).await.unwrap();
    assert!(
        before.as_array().unwrap().iter().any(|t| t["id"] == a),
        "query_tasks surfaces blocked tasks (blocking only hides them from list_available_tasks)"
    );

    let available_before = d
        .dispatch("list_available_tasks", json!({"agent_type": "implementation", "project_id": null, "limit": 100}))
        .await
        .unwrap();
    assert!(
        !available_before.as_array().unwrap().iter().any(|t| t["id"] == a),
        "list_available_tasks must exclude a task whose blocker is not complete"
    );

    d.dispatch(
        "complete_task",
        json!({"task_id": b, "agent_id": "agent", "notes": null, "actual_hours": null, "followup": null}),
    )
    .await
    .unwrap();

    let available_after = d
        .dispatch("list_available_tasks", json!({"agent_type": "implementation", "project_id": null, "limit": 100}))
        .await
        .unwrap();
    assert!(available_after.as_array().unwrap().iter().any(|t| t["id"] == a));
}

#[tokio::test]
async fn unknown_top_level_field_is_rejected() {
    let d = dispatcher();
    let err = d
        .dispatch("query_stale_tasks", json!({"hours": 1, "limit": 10, "extra": true}))
        .await
        .unwrap_err();
    assert!(matches!(err, mcp_protocol::McpError::Protocol(_)));
}
