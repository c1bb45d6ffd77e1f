//! End-to-end tests driving the Tool Dispatcher against a real, migrated
//! SQLite database on disk — the one layer the per-crate unit and contract
//! suites don't exercise together: config-shaped store setup, the wire
//! `{method, params}` envelope, and the Lifecycle/Query Engines underneath.

use std::sync::Arc;

use database::SqliteStore;
use mcp_protocol::Dispatcher;
use serde_json::json;
use task_core::events::NullEventPublisher;
use task_core::lifecycle::LifecycleEngine;
use task_core::query::QueryEngine;
use task_core::store::Store;
use tempfile::TempDir;

async fn dispatcher_over_temp_db() -> (Dispatcher, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let db_path = dir.path().join("tasks.sqlite");
    let url = format!("sqlite://{}", db_path.display());

    let sqlite = SqliteStore::new(&url).await.expect("open store");
    sqlite.migrate().await.expect("run migrations");

    let store: Arc<dyn Store> = Arc::new(sqlite);
    let lifecycle = Arc::new(LifecycleEngine::new(store.clone(), Arc::new(NullEventPublisher), 3));
    let query = Arc::new(QueryEngine::new(store.clone()));
    (Dispatcher::new(lifecycle, query, store), dir)
}

#[tokio::test]
async fn full_task_lifecycle_through_the_dispatcher() {
    let (dispatcher, _dir) = dispatcher_over_temp_db().await;

    let created = dispatcher
        .dispatch(
            "create_task",
            json!({
                "title": "Ship the release notes",
                "task_type": "concrete",
                "task_instruction": "draft and publish the notes",
                "verification_instruction": "notes are live on the release page",
                "agent_id": "agent-writer",
                "project_id": null,
                "parent_task_id": null,
                "relationship_type": null,
                "priority": "high",
                "notes": null,
                "estimated_hours": 2.0,
                "due_date": null,
            }),
        )
        .await
        .unwrap();
    let task_id = created["task"]["id"].as_i64().unwrap();
    assert_eq!(created["task"]["task_status"], "available");

    let reserved = dispatcher
        .dispatch("reserve_task", json!({"task_id": task_id, "agent_id": "agent-writer"}))
        .await
        .unwrap();
    assert_eq!(reserved["task"]["task_status"], "in_progress");

    // A second agent cannot reserve what's already claimed.
    let conflict = dispatcher
        .dispatch("reserve_task", json!({"task_id": task_id, "agent_id": "agent-other"}))
        .await;
    assert!(conflict.is_err());

    let completed = dispatcher
        .dispatch(
            "complete_task",
            json!({
                "task_id": task_id,
                "agent_id": "agent-writer",
                "notes": "published",
                "actual_hours": 1.5,
                "followup": null,
            }),
        )
        .await
        .unwrap();
    assert_eq!(completed["task"]["task_status"], "complete");

    let verified = dispatcher
        .dispatch("verify_task", json!({"task_id": task_id, "agent_id": "agent-writer"}))
        .await
        .unwrap();
    assert_eq!(verified["verification_status"], "verified");
}

#[tokio::test]
async fn subtask_creation_wires_a_blocking_relationship() {
    let (dispatcher, _dir) = dispatcher_over_temp_db().await;

    let parent = dispatcher
        .dispatch(
            "create_task",
            json!({
                "title": "Launch v2",
                "task_type": "epic",
                "task_instruction": "coordinate the v2 launch",
                "verification_instruction": "v2 is live",
                "agent_id": "agent-lead",
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
    let parent_id = parent["task"]["id"].as_i64().unwrap();

    let child = dispatcher
        .dispatch(
            "create_task",
            json!({
                "title": "Write migration guide",
                "task_type": "concrete",
                "task_instruction": "write it",
                "verification_instruction": "guide published",
                "agent_id": "agent-lead",
                "project_id": null,
                "parent_task_id": parent_id,
                "relationship_type": "subtask",
                "priority": null,
                "notes": null,
                "estimated_hours": null,
                "due_date": null,
            }),
        )
        .await
        .unwrap();
    assert!(child["relationship_id"].as_i64().is_some());
}

#[tokio::test]
async fn bulk_unlock_is_all_or_nothing() {
    let (dispatcher, _dir) = dispatcher_over_temp_db().await;

    let mut reserved_ids = Vec::new();
    for i in 0..2 {
        let created = dispatcher
            .dispatch(
                "create_task",
                json!({
                    "title": format!("Task {i}"),
                    "task_type": "concrete",
                    "task_instruction": "do it",
                    "verification_instruction": "check it",
                    "agent_id": "agent-a",
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
        let id = created["task"]["id"].as_i64().unwrap();
        dispatcher
            .dispatch("reserve_task", json!({"task_id": id, "agent_id": "agent-a"}))
            .await
            .unwrap();
        reserved_ids.push(id);
    }

    // One id doesn't exist, so the whole batch must fail without mutating
    // the tasks that otherwise would have succeeded.
    let bogus_id = reserved_ids.iter().max().unwrap() + 1000;
    let outcomes = dispatcher
        .dispatch(
            "bulk_unlock_tasks",
            json!({"task_ids": [reserved_ids[0], reserved_ids[1], bogus_id], "agent_id": "agent-a"}),
        )
        .await
        .unwrap();
    let ok_count = outcomes["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|o| o["ok"].as_bool().unwrap_or(false))
        .count();
    assert!(ok_count < 3);

    let still_in_progress = dispatcher
        .dispatch("get_task", json!({"task_id": reserved_ids[0]}))
        .await
        .unwrap();
    assert_eq!(still_in_progress["task_status"], "in_progress");
}

#[tokio::test]
async fn tags_comments_and_projects_round_trip() {
    let (dispatcher, _dir) = dispatcher_over_temp_db().await;

    let project = dispatcher
        .dispatch("create_project", json!({"name": "task-coordinator", "local_path_hint": null, "origin_url": null, "description": null}))
        .await
        .unwrap();
    let project_id = project["id"].as_i64().unwrap();

    let task = dispatcher
        .dispatch(
            "create_task",
            json!({
                "title": "Wire up CI",
                "task_type": "concrete",
                "task_instruction": "add CI",
                "verification_instruction": "CI runs on PRs",
                "agent_id": "agent-ci",
                "project_id": project_id,
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
    let task_id = task["task"]["id"].as_i64().unwrap();

    let tag = dispatcher
        .dispatch("assign_task_tag", json!({"task_id": task_id, "tag_name": "infra"}))
        .await
        .unwrap();
    let tag_id = tag["id"].as_i64().unwrap();

    let tags = dispatcher.dispatch("get_task_tags", json!({"task_id": task_id})).await.unwrap();
    assert_eq!(tags.as_array().unwrap().len(), 1);

    dispatcher
        .dispatch("remove_task_tag", json!({"task_id": task_id, "tag_id": tag_id}))
        .await
        .unwrap();
    let tags_after = dispatcher.dispatch("get_task_tags", json!({"task_id": task_id})).await.unwrap();
    assert!(tags_after.as_array().unwrap().is_empty());

    let comment = dispatcher
        .dispatch(
            "create_comment",
            json!({"task_id": task_id, "agent_id": "agent-ci", "content": "looks good", "parent_comment_id": null}),
        )
        .await
        .unwrap();
    assert_eq!(comment["content"], "looks good");
}

#[tokio::test]
async fn unknown_tool_name_is_rejected_as_a_protocol_error() {
    let (dispatcher, _dir) = dispatcher_over_temp_db().await;
    let err = dispatcher.dispatch("delete_everything", json!({})).await.unwrap_err();
    assert!(err.to_string().contains("unknown method"));
}
