//! Query Engine: every read-only surface exposed to agents and dashboards.
//!
//! `list_available` is the only read that consults the Dependency Resolver
//! (work discovery must exclude effectively-blocked tasks); every other
//! method is a direct, filtered pass-through to the `Store`'s indexed scans.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::dependency::DependencyResolver;
use crate::error::{Result, TaskError};
use crate::models::{ChangeEntry, Task};
use crate::store::{
    ActivityFeedFilter, ActivityEntry, OrderBy, Statistics, StatisticsFilter, Store, TaskFilter,
    TaskSummary,
};
use crate::validation::TaskValidator;

pub struct QueryEngine {
    store: Arc<dyn Store>,
    resolver: DependencyResolver,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            resolver: DependencyResolver::new(store.clone()),
            store,
        }
    }

    /// Work discovery: tasks in `available` state with every dependency
    /// satisfied, ordered and capped per the caller's filter.
    pub async fn list_available(&self, mut filter: TaskFilter) -> Result<Vec<Task>> {
        TaskValidator::validate_limit(filter.limit)?;
        filter.task_status = Some(crate::models::TaskStatus::Available);
        if filter.order_by.is_none() {
            filter.order_by = Some(OrderBy::PriorityDesc);
        }

        // Over-fetch so that after excluding blocked tasks we still have
        // up to `limit` results, without looping indefinitely: the store
        // already orders by priority, so dropping blocked entries from a
        // larger page preserves the intended order.
        let page_limit = filter.limit.saturating_mul(4).min(4000).max(filter.limit);
        let mut probe = filter.clone();
        probe.limit = page_limit;
        let candidates = self.store.list_tasks(&probe).await?;

        let ids: Vec<i64> = candidates.iter().map(|t| t.id).collect();
        let blocked = self.resolver.blocked(&ids).await?;

        Ok(candidates
            .into_iter()
            .filter(|t| !blocked.contains(&t.id))
            .take(filter.limit as usize)
            .collect())
    }

    pub async fn get_task(&self, id: i64) -> Result<Task> {
        self.store
            .get_task(id)
            .await?
            .ok_or_else(|| TaskError::not_found("task", id))
    }

    /// The task, its project, `subtask` ancestry root-first, chronological
    /// updates, the most recent change entries, and a stale warning when the
    /// latest finding update indicates an administrative unlock.
    pub async fn get_task_context(&self, task_id: i64) -> Result<crate::protocol::TaskContext> {
        let task = self.get_task(task_id).await?;

        let project = match task.project_id {
            Some(pid) => self.store.get_project(pid).await?,
            None => None,
        };

        let mut ancestry = Vec::new();
        let mut current = task_id;
        loop {
            let edges = self.store.relationships_touching(&[current]).await?;
            let parent_edge = edges.iter().find(|e| {
                e.relationship_type == crate::models::RelationshipType::Subtask && e.child_task_id == current
            });
            match parent_edge {
                Some(edge) => {
                    let parent = self.get_task(edge.parent_task_id).await?;
                    current = parent.id;
                    ancestry.push(parent);
                    if ancestry.len() > 1000 {
                        break; // guards against a corrupted cyclic subtask chain
                    }
                }
                None => break,
            }
        }
        ancestry.reverse();

        let updates = self.store.list_updates(task_id).await?;
        let recent_changes = self.change_history(task_id).await?;

        let stale_warning = match self.store.latest_finding_update(task_id).await? {
            Some(u) if u.content.starts_with("auto-unlock after") => u
                .metadata
                .as_ref()
                .and_then(|m| m.get("previous_agent"))
                .and_then(|v| v.as_str())
                .map(|previous_agent| crate::models::StaleWarning {
                    previous_agent: previous_agent.to_string(),
                    unlocked_at: u.created_at,
                    reason: u.content.clone(),
                }),
            _ => None,
        };

        Ok(crate::protocol::TaskContext {
            task,
            project,
            ancestry,
            updates,
            recent_changes,
            stale_warning,
        })
    }

    pub async fn query(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        TaskValidator::validate_limit(filter.limit)?;
        self.store.list_tasks(&filter).await
    }

    pub async fn count(&self, filter: TaskFilter) -> Result<u64> {
        self.store.count_tasks(&filter).await
    }

    pub async fn summary(&self, filter: TaskFilter) -> Result<Vec<TaskSummary>> {
        TaskValidator::validate_limit(filter.limit)?;
        let tasks = self.store.list_tasks(&filter).await?;
        Ok(tasks.iter().map(TaskSummary::from).collect())
    }

    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<Task>> {
        TaskValidator::validate_non_empty("query", query)?;
        TaskValidator::validate_limit(limit)?;
        self.store.search_tasks(query, limit).await
    }

    pub async fn statistics(&self, filter: StatisticsFilter) -> Result<Statistics> {
        self.store.statistics(&filter).await
    }

    pub async fn recent_completions(&self, project_id: Option<i64>, limit: u32) -> Result<Vec<TaskSummary>> {
        TaskValidator::validate_limit(limit)?;
        let filter = TaskFilter {
            project_id,
            task_status: Some(crate::models::TaskStatus::Complete),
            order_by: Some(OrderBy::CreatedAtDesc),
            limit,
            ..Default::default()
        };
        let tasks = self.store.list_tasks(&filter).await?;
        Ok(tasks.iter().map(TaskSummary::from).collect())
    }

    /// Tasks with a `due_date` inside `[now, now + within)`, soonest first.
    pub async fn approaching_deadline(&self, within: Duration, limit: u32) -> Result<Vec<TaskSummary>> {
        TaskValidator::validate_limit(limit)?;
        let now = Utc::now();
        let filter = TaskFilter {
            completed_before: None,
            order_by: Some(OrderBy::CreatedAtAsc),
            limit: limit.saturating_mul(4).min(4000).max(limit),
            ..Default::default()
        };
        let tasks = self.store.list_tasks(&filter).await?;
        let deadline = now + within;
        let mut due: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.task_status != crate::models::TaskStatus::Complete)
            .filter(|t| t.task_status != crate::models::TaskStatus::Cancelled)
            .filter(|t| matches!(t.due_date, Some(d) if d >= now && d < deadline))
            .collect();
        due.sort_by_key(|t| t.due_date);
        Ok(due.into_iter().take(limit as usize).map(TaskSummary::from).collect())
    }

    /// Tasks currently `in_progress` beyond `stale_timeout` — the same
    /// predicate the sweeper uses, exposed read-only for dashboards.
    pub async fn stale(&self, stale_timeout: Duration, limit: u32) -> Result<Vec<TaskSummary>> {
        TaskValidator::validate_limit(limit)?;
        let cutoff = Utc::now() - stale_timeout;
        let filter = TaskFilter {
            task_status: Some(crate::models::TaskStatus::InProgress),
            limit: 10_000,
            ..Default::default()
        };
        let tasks = self.store.list_tasks(&filter).await?;
        Ok(tasks
            .iter()
            .filter(|t| t.assigned_at.map(|a| a < cutoff).unwrap_or(false))
            .take(limit as usize)
            .map(TaskSummary::from)
            .collect())
    }

    pub async fn activity_feed(&self, filter: ActivityFeedFilter) -> Result<Vec<ActivityEntry>> {
        TaskValidator::validate_limit(filter.limit.max(1))?;
        self.store.activity_feed(&filter).await
    }

    pub async fn change_history(&self, task_id: i64) -> Result<Vec<ChangeEntry>> {
        self.store
            .list_change_entries(&crate::store::ChangeEntryFilter {
                task_id: Some(task_id),
                limit: 10_000,
                ..Default::default()
            })
            .await
    }

    pub async fn diff_versions(
        &self,
        task_id: i64,
        v1: i64,
        v2: i64,
    ) -> Result<Vec<crate::models::FieldDiff>> {
        let version1 = self
            .store
            .get_version(task_id, v1)
            .await?
            .ok_or_else(|| TaskError::not_found("task version", v1))?;
        let version2 = self
            .store
            .get_version(task_id, v2)
            .await?
            .ok_or_else(|| TaskError::not_found("task version", v2))?;
        Ok(diff_task_snapshots(&version1.snapshot, &version2.snapshot))
    }

    pub fn as_due_window(hours: i64) -> Duration {
        Duration::hours(hours)
    }

    /// Aggregates completed-task outcomes for one agent: count, mean
    /// `actual_hours`, verified-on-first-pass rate, breakdown by task type.
    pub async fn agent_performance(
        &self,
        agent_id: &str,
        task_type: Option<crate::models::TaskType>,
    ) -> Result<crate::protocol::AgentPerformance> {
        TaskValidator::validate_agent_id(agent_id)?;
        let filter = TaskFilter {
            assigned_agent: Some(agent_id.to_string()),
            task_status: Some(crate::models::TaskStatus::Complete),
            task_type,
            limit: 10_000,
            ..Default::default()
        };
        let tasks = self.store.list_tasks(&filter).await?;

        let completed_count = tasks.len() as u64;
        let mut by_type: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
        let mut hours_sum = 0.0;
        let mut hours_count = 0u64;
        let mut verified_count = 0u64;
        for t in &tasks {
            *by_type.entry(t.task_type.to_string()).or_insert(0) += 1;
            if let Some(h) = t.actual_hours {
                hours_sum += h;
                hours_count += 1;
            }
            if t.verification_status == crate::models::VerificationStatus::Verified {
                verified_count += 1;
            }
        }

        Ok(crate::protocol::AgentPerformance {
            agent_id: agent_id.to_string(),
            completed_count,
            mean_actual_hours: if hours_count > 0 {
                hours_sum / hours_count as f64
            } else {
                0.0
            },
            success_rate: if completed_count > 0 {
                verified_count as f64 / completed_count as f64
            } else {
                0.0
            },
            by_type,
        })
    }
}

fn diff_task_snapshots(a: &Task, b: &Task) -> Vec<crate::models::FieldDiff> {
    macro_rules! diff_field {
        ($out:ident, $name:literal, $a:expr, $b:expr) => {
            let av = $a.map(|v| v.to_string());
            let bv = $b.map(|v| v.to_string());
            if av != bv {
                $out.push(crate::models::FieldDiff {
                    field: $name.to_string(),
                    v1_value: av,
                    v2_value: bv,
                });
            }
        };
    }

    let mut out = Vec::new();
    diff_field!(out, "title", Some(&a.title), Some(&b.title));
    diff_field!(out, "task_type", Some(a.task_type), Some(b.task_type));
    diff_field!(out, "project_id", a.project_id, b.project_id);
    diff_field!(out, "priority", Some(a.priority), Some(b.priority));
    diff_field!(out, "task_status", Some(a.task_status), Some(b.task_status));
    diff_field!(
        out,
        "verification_status",
        Some(a.verification_status),
        Some(b.verification_status)
    );
    diff_field!(out, "assigned_agent", a.assigned_agent.as_deref(), b.assigned_agent.as_deref());
    diff_field!(out, "task_instruction", Some(&a.task_instruction), Some(&b.task_instruction));
    diff_field!(out, "verification_instruction", Some(&a.verification_instruction), Some(&b.verification_instruction));
    diff_field!(out, "notes", a.notes.as_deref(), b.notes.as_deref());
    diff_field!(out, "estimated_hours", a.estimated_hours, b.estimated_hours);
    diff_field!(out, "actual_hours", a.actual_hours, b.actual_hours);
    diff_field!(out, "due_date", a.due_date.map(|d: DateTime<Utc>| d.to_rfc3339()), b.due_date.map(|d: DateTime<Utc>| d.to_rfc3339()));
    diff_field!(
        out,
        "completed_at",
        a.completed_at.map(|d: DateTime<Utc>| d.to_rfc3339()),
        b.completed_at.map(|d: DateTime<Utc>| d.to_rfc3339())
    );
    diff_field!(out, "github_issue_url", a.github_issue_url.as_deref(), b.github_issue_url.as_deref());
    diff_field!(out, "github_pr_url", a.github_pr_url.as_deref(), b.github_pr_url.as_deref());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, TaskStatus, TaskType, VerificationStatus};

    fn sample(id: i64, status: TaskStatus) -> Task {
        Task {
            id,
            project_id: None,
            task_type: TaskType::Concrete,
            priority: Priority::Medium,
            title: "t".into(),
            task_instruction: "do the thing now".into(),
            verification_instruction: "check the thing now".into(),
            notes: None,
            assigned_agent: None,
            assigned_at: None,
            task_status: status,
            verification_status: VerificationStatus::Unverified,
            estimated_hours: None,
            actual_hours: None,
            due_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
            github_issue_url: None,
            github_pr_url: None,
        }
    }

    #[test]
    fn diff_detects_status_and_title_changes() {
        let mut a = sample(1, TaskStatus::Available);
        let mut b = a.clone();
        b.task_status = TaskStatus::InProgress;
        b.title = "new title here".into();
        a.assigned_agent = None;
        let diffs = diff_task_snapshots(&a, &b);
        assert!(diffs.iter().any(|d| d.field == "task_status"));
        assert!(diffs.iter().any(|d| d.field == "title"));
    }

    #[test]
    fn diff_is_empty_for_identical_snapshots() {
        let a = sample(1, TaskStatus::Available);
        let b = a.clone();
        assert!(diff_task_snapshots(&a, &b).is_empty());
    }

    #[test]
    fn diff_detects_github_issue_link_change() {
        let a = sample(1, TaskStatus::InProgress);
        let mut b = a.clone();
        b.github_issue_url = Some("https://github.com/example/repo/issues/1".into());
        let diffs = diff_task_snapshots(&a, &b);
        let entry = diffs.iter().find(|d| d.field == "github_issue_url").expect("github_issue_url diffed");
        assert_eq!(entry.v1_value, None);
        assert_eq!(entry.v2_value.as_deref(), Some("https://github.com/example/repo/issues/1"));
    }
}
