//! The tool dispatcher: a pure `match` over method names, with no transport
//! attached. Each arm deserializes its parameters (rejecting unknown fields),
//! calls into `task-core`'s `LifecycleEngine` or `QueryEngine` (or the
//! `Store` directly for the entities those engines don't own), and
//! serializes the result. Transport-level concerns — HTTP routing, SSE
//! framing, authentication — live outside this crate entirely.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use task_core::lifecycle::{FollowupSpec, LifecycleEngine};
use task_core::models::Priority;
use task_core::protocol::{
    self, AddTaskUpdateParams, AssignTaskTagParams, BulkUnlockTasksParams, CancelTaskParams,
    CompleteTaskParams, CreateCommentParams, CreateProjectParams, CreateTagParams, CreateTaskParams,
    DeleteCommentParams, DiffTaskVersionsParams, GetActivityFeedParams, GetAgentPerformanceParams,
    GetCommentParams, GetGithubLinksParams, GetLatestTaskVersionParams, GetProjectParams,
    GetRecentCompletionsParams, GetTaskStatisticsParams, GetTaskSummaryParams,
    GetTaskTagsParams, GetTaskVersionParams, GetTaskVersionsParams, GetTasksApproachingDeadlineParams,
    GithubLinks, HealthStatus, LinkGithubIssueParams, LinkGithubPrParams, ListAvailableTasksParams,
    ListCommentsParams, QueryStaleTasksParams, QueryTasksParams, RemoveTaskTagParams,
    ReserveTaskParams, SearchTasksParams, UnlockTaskParams, UpdateCommentParams, VerifyTaskParams,
};
use task_core::query::QueryEngine;
use task_core::store::Store;

use crate::error::McpError;

/// Everything one dispatch call needs: the write path, the read path, and
/// direct `Store` access for entities neither engine wraps (tags, comments,
/// version log, GitHub links, projects).
pub struct Dispatcher {
    lifecycle: Arc<LifecycleEngine>,
    query: Arc<QueryEngine>,
    store: Arc<dyn Store>,
}

impl Dispatcher {
    pub fn new(lifecycle: Arc<LifecycleEngine>, query: Arc<QueryEngine>, store: Arc<dyn Store>) -> Self {
        Self { lifecycle, query, store }
    }

    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value, McpError> {
        match method {
            "health_check" => self.health_check().await,

            "create_task" => self.create_task(parse(params)?).await,
            "reserve_task" => self.reserve_task(parse(params)?).await,
            "complete_task" => self.complete_task(parse(params)?).await,
            "verify_task" => self.verify_task(parse(params)?).await,
            "unlock_task" => self.unlock_task(parse(params)?).await,
            "bulk_unlock_tasks" => self.bulk_unlock_tasks(parse(params)?).await,
            "cancel_task" => self.cancel_task(parse(params)?).await,
            "add_task_update" => self.add_task_update(parse(params)?).await,

            "get_task" => self.get_task(parse(params)?).await,
            "list_available_tasks" => self.list_available_tasks(parse(params)?).await,
            "query_tasks" => self.query_tasks(parse(params)?).await,
            "query_stale_tasks" => self.query_stale_tasks(parse(params)?).await,
            "get_task_statistics" => self.get_task_statistics(parse(params)?).await,
            "get_recent_completions" => self.get_recent_completions(parse(params)?).await,
            "get_task_summary" => self.get_task_summary(parse(params)?).await,
            "search_tasks" => self.search_tasks(parse(params)?).await,
            "get_tasks_approaching_deadline" => self.get_tasks_approaching_deadline(parse(params)?).await,
            "get_task_context" => self.get_task_context(parse(params)?).await,
            "get_agent_performance" => self.get_agent_performance(parse(params)?).await,
            "get_activity_feed" => self.get_activity_feed(parse(params)?).await,

            "create_tag" => self.create_tag(parse(params)?).await,
            "list_tags" => self.list_tags().await,
            "assign_task_tag" => self.assign_task_tag(parse(params)?).await,
            "remove_task_tag" => self.remove_task_tag(parse(params)?).await,
            "get_task_tags" => self.get_task_tags(parse(params)?).await,

            "create_comment" => self.create_comment(parse(params)?).await,
            "get_comment" => self.get_comment(parse(params)?).await,
            "update_comment" => self.update_comment(parse(params)?).await,
            "delete_comment" => self.delete_comment(parse(params)?).await,
            "list_comments" => self.list_comments(parse(params)?).await,

            "get_task_versions" => self.get_task_versions(parse(params)?).await,
            "get_task_version" => self.get_task_version(parse(params)?).await,
            "get_latest_task_version" => self.get_latest_task_version(parse(params)?).await,
            "diff_task_versions" => self.diff_task_versions(parse(params)?).await,

            "link_github_issue" => self.link_github_issue(parse(params)?).await,
            "link_github_pr" => self.link_github_pr(parse(params)?).await,
            "get_github_links" => self.get_github_links(parse(params)?).await,

            "create_project" => self.create_project(parse(params)?).await,
            "get_project" => self.get_project(parse(params)?).await,
            "list_projects" => self.list_projects().await,

            other => Err(McpError::Protocol(format!("unknown method: {other}"))),
        }
    }

    async fn health_check(&self) -> Result<Value, McpError> {
        let database = self.store.health_check().await.is_ok();
        let status = HealthStatus {
            status: if database { "ok".into() } else { "degraded".into() },
            database,
            ..Default::default()
        };
        Ok(json!(status))
    }

    async fn create_task(&self, p: CreateTaskParams) -> Result<Value, McpError> {
        let due_date = p.parsed_due_date()?;
        let result = self
            .lifecycle
            .create_task(
                p.title,
                p.task_type,
                p.task_instruction,
                p.verification_instruction,
                p.agent_id,
                p.project_id,
                p.parent_task_id,
                p.relationship_type,
                p.priority.unwrap_or_default(),
                p.notes,
                p.estimated_hours,
                due_date,
            )
            .await?;
        Ok(json!({"task": result.task, "relationship_id": result.relationship_id}))
    }

    async fn reserve_task(&self, p: ReserveTaskParams) -> Result<Value, McpError> {
        let (task, stale_warning) = self.lifecycle.reserve(p.task_id, &p.agent_id).await?;
        Ok(json!({"task": task, "stale_warning": stale_warning}))
    }

    async fn complete_task(&self, p: CompleteTaskParams) -> Result<Value, McpError> {
        let followup = p.followup.map(|f| FollowupSpec {
            title: f.title,
            task_type: f.task_type,
            task_instruction: f.task_instruction,
            verification_instruction: f.verification_instruction,
        });
        let result = self
            .lifecycle
            .complete(p.task_id, &p.agent_id, p.notes, p.actual_hours, followup)
            .await?;
        Ok(json!({"task": result.task, "followup_task_id": result.followup_task_id}))
    }

    async fn verify_task(&self, p: VerifyTaskParams) -> Result<Value, McpError> {
        let task = self.lifecycle.verify(p.task_id, &p.agent_id).await?;
        Ok(json!(task))
    }

    async fn unlock_task(&self, p: UnlockTaskParams) -> Result<Value, McpError> {
        let task = self.lifecycle.unlock(p.task_id, &p.agent_id).await?;
        Ok(json!(task))
    }

    async fn bulk_unlock_tasks(&self, p: BulkUnlockTasksParams) -> Result<Value, McpError> {
        let outcomes = self.lifecycle.bulk_unlock(&p.task_ids, &p.agent_id).await?;
        Ok(json!({"outcomes": outcomes}))
    }

    async fn cancel_task(&self, p: CancelTaskParams) -> Result<Value, McpError> {
        let task = self.lifecycle.cancel(p.task_id, &p.agent_id, p.reason).await?;
        Ok(json!(task))
    }

    async fn add_task_update(&self, p: AddTaskUpdateParams) -> Result<Value, McpError> {
        let update = self
            .lifecycle
            .add_update(p.task_id, &p.agent_id, p.update_type, p.content, p.metadata)
            .await?;
        Ok(json!(update))
    }

    async fn get_task(&self, p: protocol::GetTaskContextParams) -> Result<Value, McpError> {
        let task = self.query.get_task(p.task_id).await?;
        Ok(json!(task))
    }

    async fn list_available_tasks(&self, p: ListAvailableTasksParams) -> Result<Value, McpError> {
        let tasks = self.query.list_available(p.into_filter()).await?;
        Ok(json!(tasks))
    }

    async fn query_tasks(&self, p: QueryTasksParams) -> Result<Value, McpError> {
        let tasks = self.query.query(p.into_filter()).await?;
        Ok(json!(tasks))
    }

    async fn query_stale_tasks(&self, p: QueryStaleTasksParams) -> Result<Value, McpError> {
        let timeout = QueryEngine::as_due_window(p.hours.unwrap_or(24));
        let tasks = self.query.stale(timeout, p.limit).await?;
        Ok(json!(tasks))
    }

    async fn get_task_statistics(&self, p: GetTaskStatisticsParams) -> Result<Value, McpError> {
        let stats = self.query.statistics(p.into_filter()?).await?;
        Ok(json!(stats))
    }

    async fn get_recent_completions(&self, p: GetRecentCompletionsParams) -> Result<Value, McpError> {
        let tasks = self.query.recent_completions(p.project_id, p.limit).await?;
        Ok(json!(tasks))
    }

    async fn get_task_summary(&self, p: GetTaskSummaryParams) -> Result<Value, McpError> {
        let summary = self.query.summary(p.into_filter()).await?;
        Ok(json!(summary))
    }

    async fn search_tasks(&self, p: SearchTasksParams) -> Result<Value, McpError> {
        let tasks = self.query.search(&p.query, p.limit).await?;
        Ok(json!(tasks))
    }

    async fn get_tasks_approaching_deadline(&self, p: GetTasksApproachingDeadlineParams) -> Result<Value, McpError> {
        let within = chrono::Duration::days(p.days_ahead);
        let tasks = self.query.approaching_deadline(within, p.limit).await?;
        Ok(json!(tasks))
    }

    async fn get_task_context(&self, p: protocol::GetTaskContextParams) -> Result<Value, McpError> {
        let context = self.query.get_task_context(p.task_id).await?;
        Ok(json!(context))
    }

    async fn get_agent_performance(&self, p: GetAgentPerformanceParams) -> Result<Value, McpError> {
        let perf = self.query.agent_performance(&p.agent_id, p.task_type).await?;
        Ok(json!(perf))
    }

    async fn get_activity_feed(&self, p: GetActivityFeedParams) -> Result<Value, McpError> {
        let feed = self.query.activity_feed(p.into_filter()?).await?;
        Ok(json!(feed))
    }

    async fn create_tag(&self, p: CreateTagParams) -> Result<Value, McpError> {
        let tag = self.store.get_or_create_tag(&p.name).await?;
        Ok(json!(tag))
    }

    async fn list_tags(&self) -> Result<Value, McpError> {
        let tags = self.store.list_tags().await?;
        Ok(json!(tags))
    }

    async fn assign_task_tag(&self, p: AssignTaskTagParams) -> Result<Value, McpError> {
        let tag = self.store.get_or_create_tag(&p.tag_name).await?;
        self.store.assign_tag(p.task_id, tag.id).await?;
        Ok(json!(tag))
    }

    async fn remove_task_tag(&self, p: RemoveTaskTagParams) -> Result<Value, McpError> {
        self.store.remove_tag(p.task_id, p.tag_id).await?;
        Ok(json!({"removed": true}))
    }

    async fn get_task_tags(&self, p: GetTaskTagsParams) -> Result<Value, McpError> {
        let tags = self.store.list_task_tags(p.task_id).await?;
        Ok(json!(tags))
    }

    async fn create_comment(&self, p: CreateCommentParams) -> Result<Value, McpError> {
        let comment = self
            .store
            .create_comment(p.task_id, &p.agent_id, p.content, p.parent_comment_id, p.mentions, Utc::now())
            .await?;
        Ok(json!(comment))
    }

    async fn get_comment(&self, p: GetCommentParams) -> Result<Value, McpError> {
        let comment = self.store.get_comment(p.comment_id).await?;
        Ok(json!(comment))
    }

    async fn update_comment(&self, p: UpdateCommentParams) -> Result<Value, McpError> {
        let comment = self
            .store
            .update_comment(p.comment_id, &p.agent_id, p.content, Utc::now())
            .await?;
        Ok(json!(comment))
    }

    async fn delete_comment(&self, p: DeleteCommentParams) -> Result<Value, McpError> {
        self.store.delete_comment(p.comment_id, &p.agent_id).await?;
        Ok(json!({"deleted": true}))
    }

    async fn list_comments(&self, p: ListCommentsParams) -> Result<Value, McpError> {
        let comments = self.store.list_comments(p.task_id).await?;
        Ok(json!(comments))
    }

    async fn get_task_versions(&self, p: GetTaskVersionsParams) -> Result<Value, McpError> {
        let versions = self.store.list_versions(p.task_id).await?;
        Ok(json!(versions))
    }

    async fn get_task_version(&self, p: GetTaskVersionParams) -> Result<Value, McpError> {
        let version = self.store.get_version(p.task_id, p.version_number).await?;
        Ok(json!(version))
    }

    async fn get_latest_task_version(&self, p: GetLatestTaskVersionParams) -> Result<Value, McpError> {
        let version = self.store.latest_version(p.task_id).await?;
        Ok(json!(version))
    }

    async fn diff_task_versions(&self, p: DiffTaskVersionsParams) -> Result<Value, McpError> {
        let diff = self.query.diff_versions(p.task_id, p.v1, p.v2).await?;
        Ok(json!(diff))
    }

    async fn link_github_issue(&self, p: LinkGithubIssueParams) -> Result<Value, McpError> {
        protocol::validate_github_url("url", &p.url)?;
        let task = self.store.link_github_issue(p.task_id, &p.agent_id, p.url).await?;
        Ok(json!(task))
    }

    async fn link_github_pr(&self, p: LinkGithubPrParams) -> Result<Value, McpError> {
        protocol::validate_github_url("url", &p.url)?;
        let task = self.store.link_github_pr(p.task_id, &p.agent_id, p.url).await?;
        Ok(json!(task))
    }

    async fn get_github_links(&self, p: GetGithubLinksParams) -> Result<Value, McpError> {
        let task = self.query.get_task(p.task_id).await?;
        Ok(json!(GithubLinks {
            github_issue_url: task.github_issue_url,
            github_pr_url: task.github_pr_url,
        }))
    }

    async fn create_project(&self, p: CreateProjectParams) -> Result<Value, McpError> {
        let project = self
            .store
            .create_project(task_core::store::NewProject {
                name: p.name,
                local_path_hint: p.local_path_hint,
                origin_url: p.origin_url,
                description: p.description,
            })
            .await?;
        Ok(json!(project))
    }

    async fn get_project(&self, p: GetProjectParams) -> Result<Value, McpError> {
        let project = self.store.get_project(p.project_id).await?;
        Ok(json!(project))
    }

    async fn list_projects(&self) -> Result<Value, McpError> {
        let projects = self.store.list_projects().await?;
        Ok(json!(projects))
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> Result<T, McpError> {
    serde_json::from_value(params).map_err(McpError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocks::InMemoryStore;
    use task_core::events::NullEventPublisher;

    fn fixture() -> Dispatcher {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let lifecycle = Arc::new(LifecycleEngine::new(store.clone(), Arc::new(NullEventPublisher), 3));
        let query = Arc::new(QueryEngine::new(store.clone()));
        Dispatcher::new(lifecycle, query, store)
    }

    #[tokio::test]
    async fn unknown_method_is_a_protocol_error() {
        let dispatcher = fixture();
        let err = dispatcher.dispatch("not_a_real_method", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
    }

    #[tokio::test]
    async fn create_then_reserve_round_trips_through_json() {
        let dispatcher = fixture();
        let created = dispatcher
            .dispatch(
                "create_task",
                json!({
                    "title": "Dispatch Test",
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
        let task_id = created["task"]["id"].as_i64().unwrap();

        let reserved = dispatcher
            .dispatch("reserve_task", json!({"task_id": task_id, "agent_id": "agent-a"}))
            .await
            .unwrap();
        assert_eq!(reserved["task"]["task_status"], "in_progress");
    }

    #[tokio::test]
    async fn cancel_task_is_terminal() {
        let dispatcher = fixture();
        let created = dispatcher
            .dispatch(
                "create_task",
                json!({
                    "title": "Cancel Me",
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
        let task_id = created["task"]["id"].as_i64().unwrap();

        let cancelled = dispatcher
            .dispatch("cancel_task", json!({"task_id": task_id, "agent_id": "agent-a", "reason": "no longer needed"}))
            .await
            .unwrap();
        assert_eq!(cancelled["task_status"], "cancelled");

        let err = dispatcher
            .dispatch("reserve_task", json!({"task_id": task_id, "agent_id": "agent-b"}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Unavailable(_)));

        let err = dispatcher
            .dispatch("cancel_task", json!({"task_id": task_id, "agent_id": "agent-a", "reason": null}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn unknown_field_is_rejected_before_reaching_the_engine() {
        let dispatcher = fixture();
        let err = dispatcher
            .dispatch("reserve_task", json!({"task_id": 1, "agent_id": "a1", "bogus": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
    }
}
