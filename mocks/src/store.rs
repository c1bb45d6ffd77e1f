//! In-memory `Store` for exercising `task-core` without a database.
//!
//! A single `parking_lot::Mutex` guards all state, so every method here is
//! naturally atomic the same way a SQLite transaction is in `database`:
//! readers and writers never interleave. Error injection mirrors the
//! teacher's `MockTaskRepository` so tests can force a specific failure on
//! the very next call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use task_core::error::{Result, TaskError};
use task_core::models::{
    ChangeEntry, Comment, Project, Relationship, RelationshipType, Tag, Task, TaskStatus,
    TaskVersion, Update, UpdateType, VerificationStatus,
};
use task_core::store::{
    ActivityEntry, ActivityFeedFilter, BulkUnlockOutcome, ChangeEntryFilter, NewProject,
    NewTaskInput, OrderBy, Statistics, StatisticsFilter, Store, TaskFilter,
};

#[derive(Default)]
struct Inner {
    tasks: HashMap<i64, Task>,
    projects: HashMap<i64, Project>,
    relationships: HashMap<i64, Relationship>,
    tags: HashMap<i64, Tag>,
    task_tags: Vec<(i64, i64)>,
    comments: HashMap<i64, Comment>,
    updates: HashMap<i64, Update>,
    change_entries: Vec<ChangeEntry>,
    versions: HashMap<i64, Vec<TaskVersion>>,
}

/// In-memory `Store`. Every id sequence starts at 1, matching `database`'s
/// `AUTOINCREMENT` columns closely enough that fixtures built against one
/// read naturally against the other.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    next_task_id: AtomicI64,
    next_project_id: AtomicI64,
    next_relationship_id: AtomicI64,
    next_tag_id: AtomicI64,
    next_comment_id: AtomicI64,
    next_update_id: AtomicI64,
    next_change_id: AtomicI64,
    error_injection: Mutex<Option<TaskError>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_task_id: AtomicI64::new(1),
            next_project_id: AtomicI64::new(1),
            next_relationship_id: AtomicI64::new(1),
            next_tag_id: AtomicI64::new(1),
            next_comment_id: AtomicI64::new(1),
            next_update_id: AtomicI64::new(1),
            next_change_id: AtomicI64::new(1),
            error_injection: Mutex::new(None),
        }
    }

    /// Forces the next `Store` call to fail with `error` instead of running.
    pub fn inject_error(&self, error: TaskError) {
        *self.error_injection.lock() = Some(error);
    }

    fn take_injected_error(&self) -> Result<()> {
        match self.error_injection.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn record_change(
        inner: &mut Inner,
        next_change_id: &AtomicI64,
        task_id: i64,
        agent_id: &str,
        change_type: &str,
        field_name: &str,
        old_value: Option<String>,
        new_value: Option<String>,
        now: DateTime<Utc>,
    ) {
        inner.change_entries.push(ChangeEntry {
            id: next_change_id.fetch_add(1, Ordering::SeqCst),
            task_id,
            agent_id: agent_id.to_string(),
            change_type: change_type.to_string(),
            field_name: field_name.to_string(),
            old_value,
            new_value,
            created_at: now,
        });
    }

    fn record_version(inner: &mut Inner, task: &Task, now: DateTime<Utc>) {
        let versions = inner.versions.entry(task.id).or_default();
        let version_number = versions.last().map(|v| v.version_number + 1).unwrap_or(1);
        versions.push(TaskVersion {
            task_id: task.id,
            version_number,
            snapshot: task.clone(),
            created_at: now,
        });
    }

    fn unlock_locked(
        inner: &mut Inner,
        next_change_id: &AtomicI64,
        task_id: i64,
        actor_id: &str,
        expected_agent: &str,
        reason_note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let prior = inner
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or_else(|| TaskError::not_found("task", task_id))?;

        if prior.assigned_agent.as_deref() != Some(expected_agent) {
            return Err(TaskError::not_assigned(expected_agent, task_id));
        }
        if prior.task_status != TaskStatus::InProgress {
            return Err(TaskError::invalid_transition(prior.task_status, TaskStatus::Available));
        }

        let task = {
            let t = inner.tasks.get_mut(&task_id).expect("checked above");
            t.task_status = TaskStatus::Available;
            t.assigned_agent = None;
            t.assigned_at = None;
            t.updated_at = now;
            t.clone()
        };

        Self::record_change(
            inner,
            next_change_id,
            task_id,
            actor_id,
            "unlock",
            "task_status",
            Some("in_progress".into()),
            Some("available".into()),
            now,
        );
        Self::record_change(
            inner,
            next_change_id,
            task_id,
            actor_id,
            "unlock",
            "assigned_agent",
            Some(expected_agent.into()),
            None,
            now,
        );
        if let Some(note) = reason_note {
            Self::record_change(
                inner,
                next_change_id,
                task_id,
                actor_id,
                "unlock",
                "note",
                None,
                Some(note.to_string()),
                now,
            );
        }
        Self::record_version(inner, &task, now);
        Ok(task)
    }
}

fn matches_filter(task: &Task, filter: &TaskFilter, task_tags: &[(i64, i64)]) -> bool {
    if let Some(project_id) = filter.project_id {
        if task.project_id != Some(project_id) {
            return false;
        }
    }
    if let Some(task_type) = filter.task_type {
        if task.task_type != task_type {
            return false;
        }
    }
    if let Some(ref task_types) = filter.task_types {
        if !task_types.contains(&task.task_type) {
            return false;
        }
    }
    if let Some(task_status) = filter.task_status {
        if task.task_status != task_status {
            return false;
        }
    }
    if let Some(ref agent) = filter.assigned_agent {
        if task.assigned_agent.as_deref() != Some(agent.as_str()) {
            return false;
        }
    }
    if let Some(priority) = filter.priority {
        if task.priority != priority {
            return false;
        }
    }
    if let Some(tag_id) = filter.tag_id {
        if !task_tags.iter().any(|&(t, g)| t == task.id && g == tag_id) {
            return false;
        }
    }
    if let Some(ref tag_ids) = filter.tag_ids {
        if !tag_ids.iter().any(|tag_id| task_tags.iter().any(|&(t, g)| t == task.id && g == *tag_id)) {
            return false;
        }
    }
    if let Some(after) = filter.created_after {
        if task.created_at < after {
            return false;
        }
    }
    if let Some(before) = filter.created_before {
        if task.created_at > before {
            return false;
        }
    }
    if let Some(after) = filter.completed_after {
        if task.completed_at.map(|c| c < after).unwrap_or(true) {
            return false;
        }
    }
    if let Some(before) = filter.completed_before {
        if task.completed_at.map(|c| c > before).unwrap_or(true) {
            return false;
        }
    }
    true
}

fn sort_tasks(tasks: &mut [Task], order_by: Option<OrderBy>) {
    match order_by {
        Some(OrderBy::PriorityDesc) => {
            tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)).then(a.id.cmp(&b.id)))
        }
        Some(OrderBy::PriorityAsc) => {
            tasks.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)).then(a.id.cmp(&b.id)))
        }
        Some(OrderBy::CreatedAtAsc) => tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id))),
        Some(OrderBy::CreatedAtDesc) => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))),
        None => {}
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn health_check(&self) -> Result<()> {
        self.take_injected_error()
    }

    // ---- Projects -----------------------------------------------------

    async fn create_project(&self, new: NewProject) -> Result<Project> {
        self.take_injected_error()?;
        let now = Utc::now();
        let id = self.next_project_id.fetch_add(1, Ordering::SeqCst);
        let project = Project {
            id,
            name: new.name,
            local_path_hint: new.local_path_hint,
            origin_url: new.origin_url,
            description: new.description,
            created_at: now,
            updated_at: now,
        };
        self.inner.lock().projects.insert(id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.take_injected_error()?;
        Ok(self.inner.lock().projects.get(&id).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.take_injected_error()?;
        let mut projects: Vec<_> = self.inner.lock().projects.values().cloned().collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    async fn update_project_description(&self, id: i64, description: Option<String>) -> Result<Project> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let project = inner.projects.get_mut(&id).ok_or_else(|| TaskError::not_found("project", id))?;
        project.description = description;
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    // ---- Tasks: mutations -------------------------------------------------

    async fn create_task(&self, input: NewTaskInput) -> Result<Task> {
        self.take_injected_error()?;
        let now = Utc::now();
        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let task = Task {
            id,
            project_id: input.project_id,
            task_type: input.task_type,
            priority: input.priority,
            title: input.title,
            task_instruction: input.task_instruction,
            verification_instruction: input.verification_instruction,
            notes: input.notes,
            assigned_agent: None,
            assigned_at: None,
            task_status: TaskStatus::Available,
            verification_status: VerificationStatus::Unverified,
            estimated_hours: input.estimated_hours,
            actual_hours: None,
            due_date: input.due_date,
            created_at: now,
            updated_at: now,
            completed_at: None,
            github_issue_url: None,
            github_pr_url: None,
        };

        let mut inner = self.inner.lock();
        inner.tasks.insert(id, task.clone());
        Self::record_change(&mut inner, &self.next_change_id, id, &input.created_by, "create", "title", None, Some(task.title.clone()), now);
        Self::record_change(&mut inner, &self.next_change_id, id, &input.created_by, "create", "task_type", None, Some(task.task_type.to_string()), now);
        Self::record_change(&mut inner, &self.next_change_id, id, &input.created_by, "create", "priority", None, Some(task.priority.to_string()), now);
        if let Some(ref notes) = task.notes {
            Self::record_change(&mut inner, &self.next_change_id, id, &input.created_by, "create", "notes", None, Some(notes.clone()), now);
        }
        Self::record_version(&mut inner, &task, now);
        Ok(task)
    }

    async fn reserve_task(&self, task_id: i64, agent_id: &str, now: DateTime<Utc>) -> Result<Task> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let prior = inner.tasks.get(&task_id).cloned().ok_or_else(|| TaskError::not_found("task", task_id))?;
        if prior.task_status != TaskStatus::Available {
            return Err(TaskError::unavailable(format!("task {task_id} is {}, not available", prior.task_status)));
        }
        // Mirrors the SQLite CAS's correlated blocked-check: the whole
        // method runs under a single lock acquisition, so this is already
        // evaluated atomically with the status flip below.
        let directly_blocked = inner.relationships.values().any(|r| match r.relationship_type {
            RelationshipType::BlockedBy if r.parent_task_id == task_id => inner
                .tasks
                .get(&r.child_task_id)
                .map(|t| t.task_status != TaskStatus::Complete)
                .unwrap_or(false),
            RelationshipType::Blocking if r.child_task_id == task_id => inner
                .tasks
                .get(&r.parent_task_id)
                .map(|t| t.task_status != TaskStatus::Complete)
                .unwrap_or(false),
            _ => false,
        });
        if directly_blocked {
            return Err(TaskError::unavailable(format!(
                "task {task_id} is available but blocked by an unresolved dependency"
            )));
        }

        let task = {
            let t = inner.tasks.get_mut(&task_id).expect("checked above");
            t.task_status = TaskStatus::InProgress;
            t.assigned_agent = Some(agent_id.to_string());
            t.assigned_at = Some(now);
            t.updated_at = now;
            t.clone()
        };
        Self::record_change(&mut inner, &self.next_change_id, task_id, agent_id, "reserve", "assigned_agent", None, Some(agent_id.to_string()), now);
        Self::record_change(&mut inner, &self.next_change_id, task_id, agent_id, "reserve", "task_status", Some("available".into()), Some("in_progress".into()), now);
        Self::record_version(&mut inner, &task, now);
        Ok(task)
    }

    async fn complete_task(
        &self,
        task_id: i64,
        agent_id: &str,
        notes: Option<String>,
        actual_hours: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<(Task, bool)> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let prior = inner.tasks.get(&task_id).cloned().ok_or_else(|| TaskError::not_found("task", task_id))?;

        if prior.assigned_agent.as_deref() != Some(agent_id) {
            return Err(TaskError::not_assigned(agent_id, task_id));
        }

        let was_verify = match (prior.task_status, prior.verification_status) {
            (TaskStatus::InProgress, _) => false,
            (TaskStatus::Complete, VerificationStatus::Unverified) => true,
            _ => return Err(TaskError::invalid_transition(prior.task_status, TaskStatus::Complete)),
        };

        let task = {
            let t = inner.tasks.get_mut(&task_id).expect("checked above");
            t.task_status = TaskStatus::Complete;
            if was_verify {
                t.verification_status = VerificationStatus::Verified;
            } else {
                t.completed_at = Some(now);
                if let Some(ref n) = notes {
                    t.notes = Some(n.clone());
                }
                if let Some(hours) = actual_hours {
                    t.actual_hours = Some(hours);
                }
            }
            t.updated_at = now;
            t.clone()
        };

        if was_verify {
            Self::record_change(&mut inner, &self.next_change_id, task_id, agent_id, "verify", "verification_status", Some("unverified".into()), Some("verified".into()), now);
        } else {
            Self::record_change(&mut inner, &self.next_change_id, task_id, agent_id, "complete", "task_status", Some("in_progress".into()), Some("complete".into()), now);
            Self::record_change(&mut inner, &self.next_change_id, task_id, agent_id, "complete", "completed_at", None, Some(now.to_rfc3339()), now);
            if let Some(ref n) = notes {
                Self::record_change(&mut inner, &self.next_change_id, task_id, agent_id, "complete", "notes", prior.notes.clone(), Some(n.clone()), now);
            }
            if let Some(hours) = actual_hours {
                Self::record_change(&mut inner, &self.next_change_id, task_id, agent_id, "complete", "actual_hours", prior.actual_hours.map(|h| h.to_string()), Some(hours.to_string()), now);
            }
        }
        Self::record_version(&mut inner, &task, now);
        Ok((task, was_verify))
    }

    async fn verify_task(&self, task_id: i64, agent_id: &str, now: DateTime<Utc>) -> Result<Task> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let prior = inner.tasks.get(&task_id).cloned().ok_or_else(|| TaskError::not_found("task", task_id))?;
        if prior.assigned_agent.as_deref() != Some(agent_id) {
            return Err(TaskError::not_assigned(agent_id, task_id));
        }
        if prior.task_status != TaskStatus::Complete || prior.verification_status != VerificationStatus::Unverified {
            return Err(TaskError::invalid_transition(prior.task_status, TaskStatus::Complete));
        }

        let task = {
            let t = inner.tasks.get_mut(&task_id).expect("checked above");
            t.verification_status = VerificationStatus::Verified;
            t.updated_at = now;
            t.clone()
        };
        Self::record_change(&mut inner, &self.next_change_id, task_id, agent_id, "verify", "verification_status", Some("unverified".into()), Some("verified".into()), now);
        Self::record_version(&mut inner, &task, now);
        Ok(task)
    }

    async fn unlock_task(
        &self,
        task_id: i64,
        actor_id: &str,
        expected_agent: &str,
        reason_note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        Self::unlock_locked(&mut inner, &self.next_change_id, task_id, actor_id, expected_agent, reason_note.as_deref(), now)
    }

    async fn bulk_unlock_tasks(
        &self,
        task_ids: &[i64],
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<BulkUnlockOutcome>> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let snapshot = inner.tasks.clone();
        let mut outcomes = Vec::with_capacity(task_ids.len());

        for &task_id in task_ids {
            match Self::unlock_locked(&mut inner, &self.next_change_id, task_id, agent_id, agent_id, None, now) {
                Ok(_) => outcomes.push(BulkUnlockOutcome { task_id, ok: true, error: None }),
                Err(e) => {
                    inner.tasks = snapshot;
                    return Ok(task_ids
                        .iter()
                        .map(|&id| BulkUnlockOutcome {
                            task_id: id,
                            ok: false,
                            error: Some(if id == task_id {
                                e.as_tool_error()
                            } else {
                                "rolled back: a sibling task in this batch failed".to_string()
                            }),
                        })
                        .collect());
                }
            }
        }

        Ok(outcomes)
    }

    async fn link_github_issue(&self, task_id: i64, agent_id: &str, url: String) -> Result<Task> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let prior = inner.tasks.get(&task_id).cloned().ok_or_else(|| TaskError::not_found("task", task_id))?;
        let now = Utc::now();
        let task = {
            let t = inner.tasks.get_mut(&task_id).expect("checked above");
            t.github_issue_url = Some(url.clone());
            t.updated_at = now;
            t.clone()
        };
        Self::record_change(&mut inner, &self.next_change_id, task_id, agent_id, "link", "github_issue_url", prior.github_issue_url, Some(url), now);
        Self::record_version(&mut inner, &task, now);
        Ok(task)
    }

    async fn link_github_pr(&self, task_id: i64, agent_id: &str, url: String) -> Result<Task> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let prior = inner.tasks.get(&task_id).cloned().ok_or_else(|| TaskError::not_found("task", task_id))?;
        let now = Utc::now();
        let task = {
            let t = inner.tasks.get_mut(&task_id).expect("checked above");
            t.github_pr_url = Some(url.clone());
            t.updated_at = now;
            t.clone()
        };
        Self::record_change(&mut inner, &self.next_change_id, task_id, agent_id, "link", "github_pr_url", prior.github_pr_url, Some(url), now);
        Self::record_version(&mut inner, &task, now);
        Ok(task)
    }

    async fn cancel_task(
        &self,
        task_id: i64,
        agent_id: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let prior = inner.tasks.get(&task_id).cloned().ok_or_else(|| TaskError::not_found("task", task_id))?;
        if matches!(prior.task_status, TaskStatus::Complete | TaskStatus::Cancelled) {
            return Err(TaskError::invalid_transition(prior.task_status, TaskStatus::Cancelled));
        }

        let task = {
            let t = inner.tasks.get_mut(&task_id).expect("checked above");
            t.task_status = TaskStatus::Cancelled;
            t.updated_at = now;
            t.clone()
        };
        Self::record_change(
            &mut inner,
            &self.next_change_id,
            task_id,
            agent_id,
            "cancel",
            "task_status",
            Some(prior.task_status.to_string()),
            Some("cancelled".into()),
            now,
        );
        if let Some(note) = reason {
            Self::record_change(&mut inner, &self.next_change_id, task_id, agent_id, "cancel", "note", None, Some(note), now);
        }
        Self::record_version(&mut inner, &task, now);
        Ok(task)
    }

    // ---- Tasks: reads -----------------------------------------------------

    async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        self.take_injected_error()?;
        Ok(self.inner.lock().tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.take_injected_error()?;
        let inner = self.inner.lock();
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| matches_filter(t, filter, &inner.task_tags))
            .cloned()
            .collect();
        sort_tasks(&mut tasks, filter.order_by);
        tasks.truncate(filter.limit as usize);
        Ok(tasks)
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64> {
        self.take_injected_error()?;
        let inner = self.inner.lock();
        Ok(inner.tasks.values().filter(|t| matches_filter(t, filter, &inner.task_tags)).count() as u64)
    }

    async fn search_tasks(&self, query: &str, limit: u32) -> Result<Vec<Task>> {
        self.take_injected_error()?;
        let needle = query.to_lowercase();
        let inner = self.inner.lock();
        let mut hits: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| {
                t.title.to_lowercase().contains(&needle)
                    || t.task_instruction.to_lowercase().contains(&needle)
                    || t.verification_instruction.to_lowercase().contains(&needle)
                    || t.notes.as_deref().map(|n| n.to_lowercase().contains(&needle)).unwrap_or(false)
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            let a_exact = a.title.to_lowercase() == needle;
            let b_exact = b.title.to_lowercase() == needle;
            b_exact.cmp(&a_exact).then_with(|| b.created_at.cmp(&a.created_at))
        });
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn statistics(&self, filter: &StatisticsFilter) -> Result<Statistics> {
        self.take_injected_error()?;
        let inner = self.inner.lock();
        let tasks: Vec<&Task> = inner
            .tasks
            .values()
            .filter(|t| filter.project_id.map(|p| t.project_id == Some(p)).unwrap_or(true))
            .filter(|t| filter.task_type.map(|ty| t.task_type == ty).unwrap_or(true))
            .filter(|t| filter.start_date.map(|s| t.created_at >= s).unwrap_or(true))
            .filter(|t| filter.end_date.map(|e| t.created_at <= e).unwrap_or(true))
            .collect();

        let mut by_status: HashMap<String, u64> = HashMap::new();
        let mut by_type: HashMap<String, u64> = HashMap::new();
        let mut by_project: HashMap<String, u64> = HashMap::new();
        let mut complete = 0u64;
        for t in &tasks {
            *by_status.entry(t.task_status.to_string()).or_insert(0) += 1;
            *by_type.entry(t.task_type.to_string()).or_insert(0) += 1;
            let key = t.project_id.map(|p| p.to_string()).unwrap_or_else(|| "none".into());
            *by_project.entry(key).or_insert(0) += 1;
            if t.task_status == TaskStatus::Complete {
                complete += 1;
            }
        }
        let total = tasks.len() as u64;
        let completion_rate = if total == 0 { 0.0 } else { complete as f64 / total as f64 };
        Ok(Statistics { total, by_status, by_type, by_project, completion_rate })
    }

    // ---- Updates ------------------------------------------------------------

    async fn add_update(
        &self,
        task_id: i64,
        agent_id: &str,
        update_type: UpdateType,
        content: String,
        metadata: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<Update> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let id = self.next_update_id.fetch_add(1, Ordering::SeqCst);
        let update = Update { id, task_id, agent_id: agent_id.to_string(), update_type, content, metadata, created_at: now };
        inner.updates.insert(id, update.clone());
        Ok(update)
    }

    async fn list_updates(&self, task_id: i64) -> Result<Vec<Update>> {
        self.take_injected_error()?;
        let mut updates: Vec<Update> = self.inner.lock().updates.values().filter(|u| u.task_id == task_id).cloned().collect();
        updates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(updates)
    }

    async fn latest_finding_update(&self, task_id: i64) -> Result<Option<Update>> {
        self.take_injected_error()?;
        let mut updates: Vec<Update> = self
            .inner
            .lock()
            .updates
            .values()
            .filter(|u| u.task_id == task_id && u.update_type == UpdateType::Finding)
            .cloned()
            .collect();
        updates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(updates.into_iter().next())
    }

    // ---- Change log / versions ----------------------------------------------

    async fn list_change_entries(&self, filter: &ChangeEntryFilter) -> Result<Vec<ChangeEntry>> {
        self.take_injected_error()?;
        let inner = self.inner.lock();
        let mut entries: Vec<ChangeEntry> = inner
            .change_entries
            .iter()
            .filter(|c| filter.task_id.map(|id| c.task_id == id).unwrap_or(true))
            .filter(|c| filter.agent_id.as_ref().map(|a| &c.agent_id == a).unwrap_or(true))
            .filter(|c| filter.start.map(|s| c.created_at >= s).unwrap_or(true))
            .filter(|c| filter.end.map(|e| c.created_at <= e).unwrap_or(true))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        entries.truncate(filter.limit as usize);
        Ok(entries)
    }

    async fn list_versions(&self, task_id: i64) -> Result<Vec<TaskVersion>> {
        self.take_injected_error()?;
        Ok(self.inner.lock().versions.get(&task_id).cloned().unwrap_or_default())
    }

    async fn get_version(&self, task_id: i64, version_number: i64) -> Result<Option<TaskVersion>> {
        self.take_injected_error()?;
        Ok(self
            .inner
            .lock()
            .versions
            .get(&task_id)
            .and_then(|versions| versions.iter().find(|v| v.version_number == version_number).cloned()))
    }

    async fn latest_version(&self, task_id: i64) -> Result<Option<TaskVersion>> {
        self.take_injected_error()?;
        Ok(self.inner.lock().versions.get(&task_id).and_then(|v| v.last().cloned()))
    }

    async fn activity_feed(&self, filter: &ActivityFeedFilter) -> Result<Vec<ActivityEntry>> {
        self.take_injected_error()?;
        let inner = self.inner.lock();
        let changes: Vec<ActivityEntry> = inner
            .change_entries
            .iter()
            .filter(|c| filter.task_id.map(|id| c.task_id == id).unwrap_or(true))
            .filter(|c| filter.agent_id.as_ref().map(|a| &c.agent_id == a).unwrap_or(true))
            .filter(|c| filter.start.map(|s| c.created_at >= s).unwrap_or(true))
            .filter(|c| filter.end.map(|e| c.created_at <= e).unwrap_or(true))
            .cloned()
            .map(ActivityEntry::Change)
            .collect();
        let updates: Vec<ActivityEntry> = inner
            .updates
            .values()
            .filter(|u| filter.task_id.map(|id| u.task_id == id).unwrap_or(true))
            .filter(|u| filter.agent_id.as_ref().map(|a| &u.agent_id == a).unwrap_or(true))
            .filter(|u| filter.start.map(|s| u.created_at >= s).unwrap_or(true))
            .filter(|u| filter.end.map(|e| u.created_at <= e).unwrap_or(true))
            .cloned()
            .map(ActivityEntry::Update)
            .collect();
        let mut merged: Vec<ActivityEntry> = changes.into_iter().chain(updates).collect();
        merged.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        merged.truncate(filter.limit as usize);
        Ok(merged)
    }

    // ---- Relationships --------------------------------------------------------

    async fn create_relationship(
        &self,
        parent_task_id: i64,
        child_task_id: i64,
        relationship_type: RelationshipType,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Relationship> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let id = self.next_relationship_id.fetch_add(1, Ordering::SeqCst);
        let rel = Relationship { id, parent_task_id, child_task_id, relationship_type, created_at: now, created_by: created_by.to_string() };
        inner.relationships.insert(id, rel.clone());
        Ok(rel)
    }

    async fn relationships_touching(&self, task_ids: &[i64]) -> Result<Vec<Relationship>> {
        self.take_injected_error()?;
        Ok(self
            .inner
            .lock()
            .relationships
            .values()
            .filter(|r| task_ids.contains(&r.parent_task_id) || task_ids.contains(&r.child_task_id))
            .cloned()
            .collect())
    }

    async fn direct_blockers(&self, task_ids: &[i64]) -> Result<Vec<(i64, Relationship, TaskStatus)>> {
        self.take_injected_error()?;
        let inner = self.inner.lock();
        let mut out = Vec::new();
        for rel in inner.relationships.values() {
            if rel.relationship_type == RelationshipType::BlockedBy && task_ids.contains(&rel.parent_task_id) {
                if let Some(other) = inner.tasks.get(&rel.child_task_id) {
                    out.push((rel.parent_task_id, rel.clone(), other.task_status));
                }
            }
            if rel.relationship_type == RelationshipType::Blocking && task_ids.contains(&rel.child_task_id) {
                if let Some(other) = inner.tasks.get(&rel.parent_task_id) {
                    out.push((rel.child_task_id, rel.clone(), other.task_status));
                }
            }
        }
        Ok(out)
    }

    async fn subtask_children(&self, parent_ids: &[i64]) -> Result<Vec<(i64, i64, TaskStatus)>> {
        self.take_injected_error()?;
        let inner = self.inner.lock();
        Ok(inner
            .relationships
            .values()
            .filter(|r| r.relationship_type == RelationshipType::Subtask && parent_ids.contains(&r.parent_task_id))
            .filter_map(|r| inner.tasks.get(&r.child_task_id).map(|t| (r.parent_task_id, r.child_task_id, t.task_status)))
            .collect())
    }

    // ---- Tags -----------------------------------------------------------------

    async fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        if let Some(tag) = inner.tags.values().find(|t| t.name == name).cloned() {
            return Ok(tag);
        }
        let id = self.next_tag_id.fetch_add(1, Ordering::SeqCst);
        let tag = Tag { id, name: name.to_string() };
        inner.tags.insert(id, tag.clone());
        Ok(tag)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        self.take_injected_error()?;
        let mut tags: Vec<Tag> = self.inner.lock().tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn assign_tag(&self, task_id: i64, tag_id: i64) -> Result<()> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        if !inner.task_tags.contains(&(task_id, tag_id)) {
            inner.task_tags.push((task_id, tag_id));
        }
        Ok(())
    }

    async fn remove_tag(&self, task_id: i64, tag_id: i64) -> Result<()> {
        self.take_injected_error()?;
        self.inner.lock().task_tags.retain(|&(t, g)| !(t == task_id && g == tag_id));
        Ok(())
    }

    async fn list_task_tags(&self, task_id: i64) -> Result<Vec<Tag>> {
        self.take_injected_error()?;
        let inner = self.inner.lock();
        let mut tags: Vec<Tag> = inner
            .task_tags
            .iter()
            .filter(|&&(t, _)| t == task_id)
            .filter_map(|&(_, tag_id)| inner.tags.get(&tag_id).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    // ---- Comments ---------------------------------------------------------------

    async fn create_comment(
        &self,
        task_id: i64,
        agent_id: &str,
        content: String,
        parent_comment_id: Option<i64>,
        mentions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Comment> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let id = self.next_comment_id.fetch_add(1, Ordering::SeqCst);
        let comment = Comment { id, task_id, agent_id: agent_id.to_string(), content, parent_comment_id, mentions, created_at: now, updated_at: None };
        inner.comments.insert(id, comment.clone());
        Ok(comment)
    }

    async fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        self.take_injected_error()?;
        Ok(self.inner.lock().comments.get(&id).cloned())
    }

    async fn update_comment(&self, id: i64, agent_id: &str, content: String, now: DateTime<Utc>) -> Result<Comment> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let comment = inner.comments.get_mut(&id).ok_or_else(|| TaskError::not_found("comment", id))?;
        if comment.agent_id != agent_id {
            return Err(TaskError::NotAssigned(format!("agent {agent_id} is not the author of comment {id}")));
        }
        comment.content = content;
        comment.updated_at = Some(now);
        Ok(comment.clone())
    }

    async fn delete_comment(&self, id: i64, agent_id: &str) -> Result<()> {
        self.take_injected_error()?;
        let mut inner = self.inner.lock();
        let comment = inner.comments.get(&id).ok_or_else(|| TaskError::not_found("comment", id))?;
        if comment.agent_id != agent_id {
            return Err(TaskError::NotAssigned(format!("agent {agent_id} is not the author of comment {id}")));
        }
        inner.comments.remove(&id);
        Ok(())
    }

    async fn list_comments(&self, task_id: i64) -> Result<Vec<Comment>> {
        self.take_injected_error()?;
        let mut comments: Vec<Comment> = self.inner.lock().comments.values().filter(|c| c.task_id == task_id).cloned().collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }
}
