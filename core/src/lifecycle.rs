//! Lifecycle Engine: the task state machine and its eight operations.
//!
//! Each operation validates its inputs, delegates the atomic write to the
//! `Store` (which owns the Change Log / Version Log transaction), and
//! publishes the resulting event. Store-layer `TransactionAborted` failures
//! are retried here, bounded, with jittered backoff; every other error
//! surfaces immediately (§4.5, §7).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::dependency::DependencyResolver;
use crate::error::{Result, TaskError};
use crate::events::{Event, EventPublisher, EventType};
use crate::models::{RelationshipType, StaleWarning, Task, TaskStatus, TaskType, Update, UpdateType};
use crate::store::{BulkUnlockOutcome, NewTaskInput, Store};

/// Synthetic actor id used when the sweeper unlocks a task administratively.
pub const SWEEPER_ACTOR: &str = "system:stale-sweeper";

pub struct LifecycleEngine {
    store: Arc<dyn Store>,
    resolver: DependencyResolver,
    publisher: Arc<dyn EventPublisher>,
    retry_budget: u32,
}

pub struct FollowupSpec {
    pub title: String,
    pub task_type: TaskType,
    pub task_instruction: String,
    pub verification_instruction: String,
}

pub struct CreateTaskResult {
    pub task: Task,
    pub relationship_id: Option<i64>,
}

pub struct CompleteResult {
    pub task: Task,
    pub followup_task_id: Option<i64>,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn EventPublisher>,
        retry_budget: u32,
    ) -> Self {
        Self {
            resolver: DependencyResolver::new(store.clone()),
            store,
            publisher,
            retry_budget,
        }
    }

    async fn with_retry<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.retry_budget => {
                    attempt += 1;
                    let jitter_ms = rand::thread_rng().gen_range(5..=50) * attempt;
                    tokio::time::sleep(Duration::from_millis(jitter_ms as u64)).await;
                    tracing::debug!(attempt, "retrying after transaction conflict");
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_task(
        &self,
        title: String,
        task_type: TaskType,
        task_instruction: String,
        verification_instruction: String,
        agent_id: String,
        project_id: Option<i64>,
        parent_task_id: Option<i64>,
        relationship_type: Option<RelationshipType>,
        priority: crate::models::Priority,
        notes: Option<String>,
        estimated_hours: Option<f64>,
        due_date: Option<DateTime<Utc>>,
    ) -> Result<CreateTaskResult> {
        crate::validation::TaskValidator::validate_title(&title)?;
        crate::validation::TaskValidator::validate_instruction("task_instruction", &task_instruction)?;
        crate::validation::TaskValidator::validate_instruction(
            "verification_instruction",
            &verification_instruction,
        )?;
        crate::validation::TaskValidator::validate_agent_id(&agent_id)?;
        if let Some(hours) = estimated_hours {
            crate::validation::TaskValidator::validate_hours("estimated_hours", hours)?;
        }

        if parent_task_id.is_some() && relationship_type.is_none() {
            return Err(TaskError::validation(
                "relationship_type is required when parent_task_id is present",
            ));
        }
        if let Some(parent_id) = parent_task_id {
            if self.store.get_task(parent_id).await?.is_none() {
                return Err(TaskError::not_found("parent task", parent_id));
            }
        }

        let input = NewTaskInput {
            project_id,
            task_type,
            priority,
            title,
            task_instruction,
            verification_instruction,
            notes,
            estimated_hours,
            due_date,
            created_by: agent_id.clone(),
        };

        let task = self.with_retry(|| self.store.create_task(input.clone())).await?;

        let mut relationship_id = None;
        if let (Some(parent_id), Some(rel_type)) = (parent_task_id, relationship_type) {
            if self
                .resolver
                .would_create_cycle(parent_id, task.id, rel_type)
                .await?
            {
                return Err(TaskError::cycle_detected(format!(
                    "linking task {} to parent {} as {} would create a cycle",
                    task.id, parent_id, rel_type
                )));
            }
            let rel = self
                .store
                .create_relationship(parent_id, task.id, rel_type, &agent_id, Utc::now())
                .await?;
            relationship_id = Some(rel.id);
            self.publisher
                .publish(Event::new(
                    EventType::RelationshipCreated,
                    task.id,
                    agent_id.clone(),
                    serde_json::json!({"parent_task_id": parent_id, "relationship_type": rel_type.to_string()}),
                ))
                .await;
        }

        self.publisher
            .publish(Event::new(
                EventType::TaskCreated,
                task.id,
                agent_id,
                serde_json::json!({"title": task.title}),
            ))
            .await;

        Ok(CreateTaskResult { task, relationship_id })
    }

    /// Atomically reserves `task_id` for `agent_id`. Exactly one concurrent
    /// caller for the same task succeeds (P3); losers get `Unavailable`.
    pub async fn reserve(&self, task_id: i64, agent_id: &str) -> Result<(Task, Option<StaleWarning>)> {
        crate::validation::TaskValidator::validate_agent_id(agent_id)?;

        // Non-authoritative fast-fail: gives a precise "blocked" error
        // without paying for a transaction when the task is obviously
        // blocked. The Store's CAS `UPDATE` re-checks the same condition
        // inside the transaction, which is the sole source of correctness.
        if self.resolver.is_blocked(task_id).await? {
            return Err(TaskError::unavailable(format!(
                "task {task_id} is blocked by an unresolved dependency"
            )));
        }

        let now = Utc::now();
        let task = self
            .with_retry(|| self.store.reserve_task(task_id, agent_id, now))
            .await?;

        let stale_warning = match self.store.latest_finding_update(task_id).await? {
            Some(update) if is_stale_finding(&update) => {
                stale_warning_from_update(&update)
            }
            _ => None,
        };

        self.publisher
            .publish(Event::new(
                EventType::TaskReserved,
                task.id,
                agent_id,
                serde_json::json!({"assigned_agent": agent_id}),
            ))
            .await;

        Ok((task, stale_warning))
    }

    pub async fn complete(
        &self,
        task_id: i64,
        agent_id: &str,
        notes: Option<String>,
        actual_hours: Option<f64>,
        followup: Option<FollowupSpec>,
    ) -> Result<CompleteResult> {
        crate::validation::TaskValidator::validate_agent_id(agent_id)?;
        if let Some(hours) = actual_hours {
            crate::validation::TaskValidator::validate_hours("actual_hours", hours)?;
        }

        let now = Utc::now();
        let (task, was_verify) = self
            .with_retry(|| {
                self.store
                    .complete_task(task_id, agent_id, notes.clone(), actual_hours, now)
            })
            .await?;

        let mut followup_task_id = None;
        if let Some(spec) = followup {
            let created = self
                .create_task(
                    spec.title,
                    spec.task_type,
                    spec.task_instruction,
                    spec.verification_instruction,
                    agent_id.to_string(),
                    task.project_id,
                    Some(task.id),
                    Some(RelationshipType::Followup),
                    crate::models::Priority::default(),
                    None,
                    None,
                    None,
                )
                .await?;
            followup_task_id = Some(created.task.id);
        }

        let (event_type, summary) = if was_verify {
            (EventType::TaskVerified, serde_json::json!({"verification_status": "verified"}))
        } else {
            (EventType::TaskCompleted, serde_json::json!({"task_status": "complete"}))
        };
        self.publisher
            .publish(Event::new(event_type, task.id, agent_id, summary))
            .await;

        Ok(CompleteResult { task, followup_task_id })
    }

    pub async fn verify(&self, task_id: i64, agent_id: &str) -> Result<Task> {
        crate::validation::TaskValidator::validate_agent_id(agent_id)?;
        let now = Utc::now();
        let task = self
            .with_retry(|| self.store.verify_task(task_id, agent_id, now))
            .await?;
        self.publisher
            .publish(Event::new(
                EventType::TaskVerified,
                task.id,
                agent_id,
                serde_json::json!({"verification_status": "verified"}),
            ))
            .await;
        Ok(task)
    }

    pub async fn unlock(&self, task_id: i64, agent_id: &str) -> Result<Task> {
        crate::validation::TaskValidator::validate_agent_id(agent_id)?;
        let now = Utc::now();
        let task = self
            .with_retry(|| self.store.unlock_task(task_id, agent_id, agent_id, None, now))
            .await?;
        self.publisher
            .publish(Event::new(
                EventType::TaskUnlocked,
                task.id,
                agent_id,
                serde_json::json!({"task_status": "available"}),
            ))
            .await;
        Ok(task)
    }

    /// All-or-nothing: either every id in `task_ids` unlocks, or the store
    /// is left unchanged (P6). Outcomes report per-id failure reasons.
    pub async fn bulk_unlock(&self, task_ids: &[i64], agent_id: &str) -> Result<Vec<BulkUnlockOutcome>> {
        crate::validation::TaskValidator::validate_agent_id(agent_id)?;
        let now = Utc::now();
        let outcomes = self
            .with_retry(|| self.store.bulk_unlock_tasks(task_ids, agent_id, now))
            .await?;

        if outcomes.iter().all(|o| o.ok) {
            for id in task_ids {
                self.publisher
                    .publish(Event::new(
                        EventType::TaskUnlocked,
                        *id,
                        agent_id,
                        serde_json::json!({"task_status": "available", "bulk": true}),
                    ))
                    .await;
            }
        }
        Ok(outcomes)
    }

    /// Moves any non-terminal task straight to `cancelled` (`* -> cancelled`
    /// is valid from every active status per `Task::can_transition_to`).
    /// Idempotent calls after the first fail with `InvalidTransition`, same
    /// as any other terminal-state re-entry.
    pub async fn cancel(&self, task_id: i64, agent_id: &str, reason: Option<String>) -> Result<Task> {
        crate::validation::TaskValidator::validate_agent_id(agent_id)?;
        let now = Utc::now();
        let task = self
            .with_retry(|| self.store.cancel_task(task_id, agent_id, reason.clone(), now))
            .await?;
        self.publisher
            .publish(Event::new(
                EventType::TaskCancelled,
                task.id,
                agent_id,
                serde_json::json!({"task_status": "cancelled"}),
            ))
            .await;
        Ok(task)
    }

    pub async fn add_update(
        &self,
        task_id: i64,
        agent_id: &str,
        update_type: UpdateType,
        content: String,
        metadata: Option<serde_json::Value>,
    ) -> Result<Update> {
        crate::validation::TaskValidator::validate_agent_id(agent_id)?;
        crate::validation::TaskValidator::validate_non_empty("content", &content)?;
        if self.store.get_task(task_id).await?.is_none() {
            return Err(TaskError::not_found("task", task_id));
        }
        let update = self
            .store
            .add_update(task_id, agent_id, update_type, content, metadata, Utc::now())
            .await?;
        self.publisher
            .publish(Event::new(
                EventType::TaskUpdated,
                task_id,
                agent_id,
                serde_json::json!({"update_type": update_type.to_string()}),
            ))
            .await;
        Ok(update)
    }

    /// Runs a single stale-sweep pass: finds `in_progress` tasks whose
    /// `assigned_at` exceeds `stale_timeout`, unlocks each (recording a
    /// finding Update), and emits `task.unlocked_stale`. Processes in
    /// bounded chunks so the writer is never held across the whole set
    /// (Design Notes §9); continues past a single task's failure.
    pub async fn sweep_stale(&self, stale_timeout: chrono::Duration, chunk_size: usize) -> Result<Vec<i64>> {
        let now = Utc::now();
        let cutoff = now - stale_timeout;
        let mut unlocked = Vec::new();

        let candidates = self
            .store
            .list_tasks(&crate::store::TaskFilter {
                task_status: Some(TaskStatus::InProgress),
                limit: 10_000,
                ..Default::default()
            })
            .await?;

        let stale: Vec<Task> = candidates
            .into_iter()
            .filter(|t| t.assigned_at.map(|a| a < cutoff).unwrap_or(false))
            .collect();

        for chunk in stale.chunks(chunk_size.max(1)) {
            for task in chunk {
                let Some(previous_agent) = task.assigned_agent.clone() else {
                    continue;
                };
                let held_for = now.signed_duration_since(task.assigned_at.unwrap_or(now));
                let note = format!(
                    "auto-unlock after {}h; previous={}",
                    held_for.num_hours(),
                    previous_agent
                );
                match self
                    .store
                    .unlock_task(task.id, SWEEPER_ACTOR, &previous_agent, Some(note.clone()), now)
                    .await
                {
                    Ok(_) => {
                        if let Err(e) = self
                            .store
                            .add_update(
                                task.id,
                                SWEEPER_ACTOR,
                                UpdateType::Finding,
                                note,
                                Some(serde_json::json!({
                                    "previous_agent": previous_agent,
                                    "unlocked_at": now,
                                })),
                                now,
                            )
                            .await
                        {
                            tracing::warn!(task_id = task.id, error = %e, "stale sweep: failed to record finding update");
                        }
                        self.publisher
                            .publish(Event::new(
                                EventType::TaskUnlockedStale,
                                task.id,
                                SWEEPER_ACTOR,
                                serde_json::json!({"previous_agent": previous_agent}),
                            ))
                            .await;
                        unlocked.push(task.id);
                    }
                    Err(e) => {
                        tracing::warn!(task_id = task.id, error = %e, "stale sweep: skipping task after failure");
                    }
                }
            }
        }

        Ok(unlocked)
    }
}

fn is_stale_finding(update: &Update) -> bool {
    update.update_type == UpdateType::Finding && update.content.starts_with("auto-unlock after")
}

fn stale_warning_from_update(update: &Update) -> Option<StaleWarning> {
    let previous_agent = update
        .metadata
        .as_ref()
        .and_then(|m| m.get("previous_agent"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())?;
    Some(StaleWarning {
        previous_agent,
        unlocked_at: update.created_at,
        reason: update.content.clone(),
    })
}
