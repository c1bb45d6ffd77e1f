//! SQLite implementation of the `Store` trait.
//!
//! Every mutation that touches a task's persistent fields runs inside a
//! single transaction together with its ChangeEntry row(s) and its
//! TaskVersion snapshot (invariant 5). The concurrency-sensitive mutations
//! (`reserve_task`, `complete_task`, `verify_task`, `unlock_task`,
//! `bulk_unlock_tasks`) additionally re-read the row inside the same
//! transaction and issue the write as a compare-and-swap `UPDATE ... WHERE`
//! against that exact prior state: a concurrent writer that commits first
//! makes the CAS affect zero rows, which surfaces as `TransactionAborted`
//! for the caller's retry loop rather than a lost update.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, QueryBuilder, Row, Sqlite, SqlitePool};

use crate::common::{
    build_filter_query, row_to_change_entry, row_to_comment, row_to_project, row_to_relationship,
    row_to_tag, row_to_task, row_to_task_version, row_to_update, sqlx_error_to_task_error,
};
use task_core::error::{Result, TaskError};
use task_core::models::{
    ChangeEntry, Comment, Project, Relationship, RelationshipType, Tag, Task, TaskStatus,
    TaskVersion, Update, UpdateType, VerificationStatus,
};
use task_core::store::{
    ActivityEntry, ActivityFeedFilter, BulkUnlockOutcome, ChangeEntryFilter, NewProject,
    NewTaskInput, Statistics, StatisticsFilter, Store, TaskFilter,
};

/// SQLite-backed `Store`.
///
/// Connects over a pooled `SqlitePool` with WAL journaling for file-backed
/// databases (in-memory databases use `Memory` journaling, which is the
/// only mode SQLite permits for them).
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_url = if database_url.starts_with(":memory:") || database_url.starts_with("sqlite://") {
            database_url.to_string()
        } else {
            format!("sqlite://{database_url}")
        };

        if !db_url.contains(":memory:") && !Sqlite::database_exists(&db_url).await.unwrap_or(false)
        {
            Sqlite::create_database(&db_url).await.map_err(|e| {
                TaskError::Fatal(format!("failed to create database at {db_url}: {e}"))
            })?;
            tracing::info!(url = %db_url, "created sqlite database file");
        }

        let connect_options = if db_url.contains(":memory:") {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&db_url)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Memory)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        } else {
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(db_url.replace("sqlite://", ""))
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
        };

        // A plain `:memory:` filename opens a fresh, unshared database per
        // connection; pinning the pool to one connection keeps every query
        // against the same logical database instead of scattering them
        // across throwaway siblings.
        let pool = if db_url.contains(":memory:") {
            sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(connect_options)
                .await
                .map_err(sqlx_error_to_task_error)?
        } else {
            SqlitePool::connect_with(connect_options)
                .await
                .map_err(sqlx_error_to_task_error)?
        };

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| TaskError::Fatal(format!("migration failed: {e}")))?;
        tracing::info!("database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_task_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        task_id: i64,
    ) -> Result<Task> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(task_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(sqlx_error_to_task_error)?
            .ok_or_else(|| TaskError::not_found("task", task_id))?;
        row_to_task(&row)
    }

    async fn record_change(
        &self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        task_id: i64,
        agent_id: &str,
        change_type: &str,
        field_name: &str,
        old_value: Option<String>,
        new_value: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO change_entries (task_id, agent_id, change_type, field_name, old_value, new_value, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(agent_id)
        .bind(change_type)
        .bind(field_name)
        .bind(old_value)
        .bind(new_value)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(sqlx_error_to_task_error)?;
        Ok(())
    }

    async fn record_version(
        &self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        task: &Task,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let next_version: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version_number), 0) + 1 FROM task_versions WHERE task_id = ?")
                .bind(task.id)
                .fetch_one(&mut **tx)
                .await
                .map_err(sqlx_error_to_task_error)?;
        let snapshot = serde_json::to_string(task)
            .map_err(|e| TaskError::Fatal(format!("task snapshot serialize failed: {e}")))?;
        sqlx::query(
            "INSERT INTO task_versions (task_id, version_number, snapshot, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(task.id)
        .bind(next_version)
        .bind(snapshot)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(sqlx_error_to_task_error)?;
        Ok(next_version)
    }

    /// Shared unlock body so `unlock_task` and `bulk_unlock_tasks` apply
    /// identical CAS and audit logic inside either a one-off or a shared
    /// transaction.
    async fn unlock_in_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        task_id: i64,
        actor_id: &str,
        expected_agent: &str,
        reason_note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let prior = self.fetch_task_tx(tx, task_id).await?;

        if prior.assigned_agent.as_deref() != Some(expected_agent) {
            return Err(TaskError::not_assigned(expected_agent, task_id));
        }
        if prior.task_status != TaskStatus::InProgress {
            return Err(TaskError::invalid_transition(prior.task_status, TaskStatus::Available));
        }

        let updated = sqlx::query(
            "UPDATE tasks SET task_status = 'available', assigned_agent = NULL, assigned_at = NULL, updated_at = ? \
             WHERE id = ? AND task_status = 'in_progress' AND assigned_agent = ?",
        )
        .bind(now)
        .bind(task_id)
        .bind(expected_agent)
        .execute(&mut **tx)
        .await
        .map_err(sqlx_error_to_task_error)?;

        if updated.rows_affected() == 0 {
            return Err(TaskError::TransactionAborted(format!(
                "task {task_id} changed concurrently during unlock"
            )));
        }

        self.record_change(tx, task_id, actor_id, "unlock", "task_status", Some("in_progress".into()), Some("available".into()), now).await?;
        self.record_change(tx, task_id, actor_id, "unlock", "assigned_agent", Some(expected_agent.into()), None, now).await?;
        if let Some(note) = reason_note {
            self.record_change(tx, task_id, actor_id, "unlock", "note", None, Some(note.to_string()), now).await?;
        }

        let task = self.fetch_task_tx(tx, task_id).await?;
        self.record_version(tx, &task, now).await?;
        Ok(task)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.map_err(sqlx_error_to_task_error)?;
        Ok(())
    }

    // ---- Projects -------------------------------------------------------

    async fn create_project(&self, new: NewProject) -> Result<Project> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO projects (name, local_path_hint, origin_url, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&new.name)
        .bind(&new.local_path_hint)
        .bind(&new.origin_url)
        .bind(&new.description)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_task_error)?;

        self.get_project(id)
            .await?
            .ok_or_else(|| TaskError::Fatal("project vanished immediately after insert".into()))
    }

    async fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        row.as_ref().map(row_to_project).transpose()
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows = sqlx::query("SELECT * FROM projects ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        rows.iter().map(row_to_project).collect()
    }

    async fn update_project_description(&self, id: i64, description: Option<String>) -> Result<Project> {
        let now = Utc::now();
        let updated = sqlx::query("UPDATE projects SET description = ?, updated_at = ? WHERE id = ?")
            .bind(&description)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        if updated.rows_affected() == 0 {
            return Err(TaskError::not_found("project", id));
        }
        self.get_project(id)
            .await?
            .ok_or_else(|| TaskError::Fatal("project vanished immediately after update".into()))
    }

    // ---- Tasks: mutations -------------------------------------------------

    async fn create_task(&self, input: NewTaskInput) -> Result<Task> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_task_error)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO tasks (project_id, task_type, priority, title, task_instruction, verification_instruction, notes, task_status, verification_status, estimated_hours, due_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 'available', 'unverified', ?, ?, ?, ?) RETURNING id",
        )
        .bind(input.project_id)
        .bind(input.task_type.to_string())
        .bind(input.priority.to_string())
        .bind(&input.title)
        .bind(&input.task_instruction)
        .bind(&input.verification_instruction)
        .bind(&input.notes)
        .bind(input.estimated_hours)
        .bind(input.due_date)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(sqlx_error_to_task_error)?;

        let task = self.fetch_task_tx(&mut tx, id).await?;

        self.record_change(&mut tx, id, &input.created_by, "create", "title", None, Some(task.title.clone()), now).await?;
        self.record_change(&mut tx, id, &input.created_by, "create", "task_type", None, Some(task.task_type.to_string()), now).await?;
        self.record_change(&mut tx, id, &input.created_by, "create", "priority", None, Some(task.priority.to_string()), now).await?;
        if let Some(ref notes) = task.notes {
            self.record_change(&mut tx, id, &input.created_by, "create", "notes", None, Some(notes.clone()), now).await?;
        }
        self.record_version(&mut tx, &task, now).await?;

        tx.commit().await.map_err(sqlx_error_to_task_error)?;
        Ok(task)
    }

    /// The blocked-check runs inside the same transaction as the status
    /// flip, as a pair of `NOT EXISTS` clauses on the CAS `UPDATE`'s `WHERE`
    /// rather than a prior `SELECT`: a `create_relationship` that lands
    /// between a separate check and this write could otherwise slip an
    /// effectively-blocked task through. The first `NOT EXISTS` mirrors
    /// `direct_blockers`' edge-direction semantics; the second walks
    /// `subtask` descendants (via a recursive CTE) for the same transitive
    /// rule the Dependency Resolver applies in `blocked()`.
    async fn reserve_task(&self, task_id: i64, agent_id: &str, now: DateTime<Utc>) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_task_error)?;

        let updated = sqlx::query(
            "WITH RECURSIVE descendants(id) AS ( \
                 SELECT child_task_id FROM relationships \
                 WHERE relationship_type = 'subtask' AND parent_task_id = ? \
                 UNION \
                 SELECT r.child_task_id FROM relationships r \
                 JOIN descendants d ON r.parent_task_id = d.id \
                 WHERE r.relationship_type = 'subtask' \
             ) \
             UPDATE tasks SET task_status = 'in_progress', assigned_agent = ?, assigned_at = ?, updated_at = ? \
             WHERE id = ? AND task_status = 'available' \
               AND NOT EXISTS ( \
                   SELECT 1 FROM relationships r JOIN tasks other ON ( \
                       (r.relationship_type = 'blocked_by' AND r.parent_task_id = tasks.id AND other.id = r.child_task_id) \
                       OR (r.relationship_type = 'blocking' AND r.child_task_id = tasks.id AND other.id = r.parent_task_id) \
                   ) WHERE other.task_status != 'complete' \
               ) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM descendants d JOIN tasks dt ON dt.id = d.id \
                   WHERE dt.task_status = 'blocked' \
                      OR EXISTS ( \
                           SELECT 1 FROM relationships r2 JOIN tasks other2 ON ( \
                               (r2.relationship_type = 'blocked_by' AND r2.parent_task_id = dt.id AND other2.id = r2.child_task_id) \
                               OR (r2.relationship_type = 'blocking' AND r2.child_task_id = dt.id AND other2.id = r2.parent_task_id) \
                           ) WHERE other2.task_status != 'complete' \
                      ) \
               )",
        )
        .bind(task_id)
        .bind(agent_id)
        .bind(now)
        .bind(now)
        .bind(task_id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_task_error)?;

        if updated.rows_affected() == 0 {
            let row = sqlx::query("SELECT task_status FROM tasks WHERE id = ?")
                .bind(task_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(sqlx_error_to_task_error)?;
            return match row {
                None => Err(TaskError::not_found("task", task_id)),
                Some(row) => {
                    let status: String = row.get("task_status");
                    if status == "available" {
                        Err(TaskError::unavailable(format!(
                            "task {task_id} is available but blocked by an unresolved dependency"
                        )))
                    } else {
                        Err(TaskError::unavailable(format!("task {task_id} is {status}, not available")))
                    }
                }
            };
        }

        let task = self.fetch_task_tx(&mut tx, task_id).await?;
        self.record_change(&mut tx, task_id, agent_id, "reserve", "assigned_agent", None, Some(agent_id.to_string()), now).await?;
        self.record_change(&mut tx, task_id, agent_id, "reserve", "task_status", Some("available".into()), Some("in_progress".into()), now).await?;
        self.record_version(&mut tx, &task, now).await?;

        tx.commit().await.map_err(sqlx_error_to_task_error)?;
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
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_task_error)?;
        let prior = self.fetch_task_tx(&mut tx, task_id).await?;

        if prior.assigned_agent.as_deref() != Some(agent_id) {
            return Err(TaskError::not_assigned(agent_id, task_id));
        }

        let was_verify = match (prior.task_status, prior.verification_status) {
            (TaskStatus::InProgress, _) => false,
            (TaskStatus::Complete, VerificationStatus::Unverified) => true,
            _ => return Err(TaskError::invalid_transition(prior.task_status, TaskStatus::Complete)),
        };

        let (new_verification, completed_at) = if was_verify {
            (VerificationStatus::Verified, prior.completed_at)
        } else {
            (VerificationStatus::Unverified, Some(now))
        };

        let updated = sqlx::query(
            "UPDATE tasks SET task_status = 'complete', verification_status = ?, completed_at = ?, \
             notes = COALESCE(?, notes), actual_hours = COALESCE(?, actual_hours), updated_at = ? \
             WHERE id = ? AND task_status = ? AND verification_status = ? AND assigned_agent = ?",
        )
        .bind(new_verification.to_string())
        .bind(completed_at)
        .bind(&notes)
        .bind(actual_hours)
        .bind(now)
        .bind(task_id)
        .bind(prior.task_status.to_string())
        .bind(prior.verification_status.to_string())
        .bind(agent_id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_task_error)?;

        if updated.rows_affected() == 0 {
            return Err(TaskError::TransactionAborted(format!(
                "task {task_id} changed concurrently during completion"
            )));
        }

        let task = self.fetch_task_tx(&mut tx, task_id).await?;

        if was_verify {
            self.record_change(&mut tx, task_id, agent_id, "verify", "verification_status", Some("unverified".into()), Some("verified".into()), now).await?;
        } else {
            self.record_change(&mut tx, task_id, agent_id, "complete", "task_status", Some("in_progress".into()), Some("complete".into()), now).await?;
            self.record_change(&mut tx, task_id, agent_id, "complete", "completed_at", None, Some(now.to_rfc3339()), now).await?;
            if let Some(ref n) = notes {
                self.record_change(&mut tx, task_id, agent_id, "complete", "notes", prior.notes.clone(), Some(n.clone()), now).await?;
            }
            if let Some(hours) = actual_hours {
                self.record_change(&mut tx, task_id, agent_id, "complete", "actual_hours", prior.actual_hours.map(|h| h.to_string()), Some(hours.to_string()), now).await?;
            }
        }
        self.record_version(&mut tx, &task, now).await?;

        tx.commit().await.map_err(sqlx_error_to_task_error)?;
        Ok((task, was_verify))
    }

    async fn verify_task(&self, task_id: i64, agent_id: &str, now: DateTime<Utc>) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_task_error)?;
        let prior = self.fetch_task_tx(&mut tx, task_id).await?;

        if prior.assigned_agent.as_deref() != Some(agent_id) {
            return Err(TaskError::not_assigned(agent_id, task_id));
        }
        if prior.task_status != TaskStatus::Complete || prior.verification_status != VerificationStatus::Unverified {
            return Err(TaskError::invalid_transition(prior.task_status, TaskStatus::Complete));
        }

        let updated = sqlx::query(
            "UPDATE tasks SET verification_status = 'verified', updated_at = ? \
             WHERE id = ? AND task_status = 'complete' AND verification_status = 'unverified' AND assigned_agent = ?",
        )
        .bind(now)
        .bind(task_id)
        .bind(agent_id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_task_error)?;

        if updated.rows_affected() == 0 {
            return Err(TaskError::TransactionAborted(format!(
                "task {task_id} changed concurrently during verification"
            )));
        }

        let task = self.fetch_task_tx(&mut tx, task_id).await?;
        self.record_change(&mut tx, task_id, agent_id, "verify", "verification_status", Some("unverified".into()), Some("verified".into()), now).await?;
        self.record_version(&mut tx, &task, now).await?;

        tx.commit().await.map_err(sqlx_error_to_task_error)?;
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
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_task_error)?;
        let task = self
            .unlock_in_tx(&mut tx, task_id, actor_id, expected_agent, reason_note.as_deref(), now)
            .await?;
        tx.commit().await.map_err(sqlx_error_to_task_error)?;
        Ok(task)
    }

    async fn bulk_unlock_tasks(
        &self,
        task_ids: &[i64],
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<BulkUnlockOutcome>> {
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_task_error)?;
        let mut outcomes = Vec::with_capacity(task_ids.len());

        for &task_id in task_ids {
            match self.unlock_in_tx(&mut tx, task_id, agent_id, agent_id, None, now).await {
                Ok(_) => outcomes.push(BulkUnlockOutcome { task_id, ok: true, error: None }),
                Err(e) => {
                    tx.rollback().await.map_err(sqlx_error_to_task_error)?;
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

        tx.commit().await.map_err(sqlx_error_to_task_error)?;
        Ok(outcomes)
    }

    async fn link_github_issue(&self, task_id: i64, agent_id: &str, url: String) -> Result<Task> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_task_error)?;
        let prior = self.fetch_task_tx(&mut tx, task_id).await?;

        sqlx::query("UPDATE tasks SET github_issue_url = ?, updated_at = ? WHERE id = ?")
            .bind(&url)
            .bind(now)
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_error_to_task_error)?;

        let task = self.fetch_task_tx(&mut tx, task_id).await?;
        self.record_change(&mut tx, task_id, agent_id, "link", "github_issue_url", prior.github_issue_url.clone(), Some(url), now).await?;
        self.record_version(&mut tx, &task, now).await?;

        tx.commit().await.map_err(sqlx_error_to_task_error)?;
        Ok(task)
    }

    async fn link_github_pr(&self, task_id: i64, agent_id: &str, url: String) -> Result<Task> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_task_error)?;
        let prior = self.fetch_task_tx(&mut tx, task_id).await?;

        sqlx::query("UPDATE tasks SET github_pr_url = ?, updated_at = ? WHERE id = ?")
            .bind(&url)
            .bind(now)
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(sqlx_error_to_task_error)?;

        let task = self.fetch_task_tx(&mut tx, task_id).await?;
        self.record_change(&mut tx, task_id, agent_id, "link", "github_pr_url", prior.github_pr_url.clone(), Some(url), now).await?;
        self.record_version(&mut tx, &task, now).await?;

        tx.commit().await.map_err(sqlx_error_to_task_error)?;
        Ok(task)
    }

    async fn cancel_task(
        &self,
        task_id: i64,
        agent_id: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(sqlx_error_to_task_error)?;
        let prior = self.fetch_task_tx(&mut tx, task_id).await?;

        let updated = sqlx::query(
            "UPDATE tasks SET task_status = 'cancelled', updated_at = ? \
             WHERE id = ? AND task_status != 'complete' AND task_status != 'cancelled'",
        )
        .bind(now)
        .bind(task_id)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_error_to_task_error)?;

        if updated.rows_affected() == 0 {
            return Err(TaskError::invalid_transition(prior.task_status, TaskStatus::Cancelled));
        }

        let task = self.fetch_task_tx(&mut tx, task_id).await?;
        self.record_change(&mut tx, task_id, agent_id, "cancel", "task_status", Some(prior.task_status.to_string()), Some("cancelled".into()), now).await?;
        if let Some(ref note) = reason {
            self.record_change(&mut tx, task_id, agent_id, "cancel", "note", None, Some(note.clone()), now).await?;
        }
        self.record_version(&mut tx, &task, now).await?;

        tx.commit().await.map_err(sqlx_error_to_task_error)?;
        Ok(task)
    }

    // ---- Tasks: reads -----------------------------------------------------

    async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        #[cfg(debug_assertions)]
        use sqlx::Execute;

        let mut qb = build_filter_query(filter);
        let query = qb.build();

        #[cfg(debug_assertions)]
        tracing::debug!(sql = %query.sql(), ?filter, "list_tasks");

        let rows = query.fetch_all(&self.pool).await.map_err(sqlx_error_to_task_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn count_tasks(&self, filter: &TaskFilter) -> Result<u64> {
        let mut unlimited = filter.clone();
        unlimited.limit = u32::MAX;
        let tasks = self.list_tasks(&unlimited).await?;
        Ok(tasks.len() as u64)
    }

    async fn search_tasks(&self, query: &str, limit: u32) -> Result<Vec<Task>> {
        let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
        let rows = sqlx::query(
            "SELECT * FROM tasks \
             WHERE title LIKE ? ESCAPE '\\' OR task_instruction LIKE ? ESCAPE '\\' \
                OR verification_instruction LIKE ? ESCAPE '\\' OR notes LIKE ? ESCAPE '\\' \
             ORDER BY (LOWER(title) = LOWER(?)) DESC, created_at DESC LIMIT ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_task_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn statistics(&self, filter: &StatisticsFilter) -> Result<Statistics> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM tasks WHERE 1 = 1");
        if let Some(project_id) = filter.project_id {
            qb.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(task_type) = filter.task_type {
            qb.push(" AND task_type = ").push_bind(task_type.to_string());
        }
        if let Some(start) = filter.start_date {
            qb.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end_date {
            qb.push(" AND created_at <= ").push_bind(end);
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(sqlx_error_to_task_error)?;
        let tasks: Result<Vec<Task>> = rows.iter().map(row_to_task).collect();
        let tasks = tasks?;

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
        let metadata_json = metadata.as_ref().map(|m| m.to_string());
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO updates (task_id, agent_id, update_type, content, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(task_id)
        .bind(agent_id)
        .bind(update_type.to_string())
        .bind(&content)
        .bind(&metadata_json)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_task_error)?;

        let row = sqlx::query("SELECT * FROM updates WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        row_to_update(&row)
    }

    async fn list_updates(&self, task_id: i64) -> Result<Vec<Update>> {
        let rows = sqlx::query("SELECT * FROM updates WHERE task_id = ? ORDER BY created_at ASC")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        rows.iter().map(row_to_update).collect()
    }

    async fn latest_finding_update(&self, task_id: i64) -> Result<Option<Update>> {
        let row = sqlx::query(
            "SELECT * FROM updates WHERE task_id = ? AND update_type = 'finding' ORDER BY created_at DESC LIMIT 1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_error_to_task_error)?;
        row.as_ref().map(row_to_update).transpose()
    }

    // ---- Change log / versions ----------------------------------------------

    async fn list_change_entries(&self, filter: &ChangeEntryFilter) -> Result<Vec<ChangeEntry>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM change_entries WHERE 1 = 1");
        if let Some(task_id) = filter.task_id {
            qb.push(" AND task_id = ").push_bind(task_id);
        }
        if let Some(ref agent_id) = filter.agent_id {
            qb.push(" AND agent_id = ").push_bind(agent_id.clone());
        }
        if let Some(start) = filter.start {
            qb.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            qb.push(" AND created_at <= ").push_bind(end);
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ").push_bind(filter.limit as i64);

        let rows = qb.build().fetch_all(&self.pool).await.map_err(sqlx_error_to_task_error)?;
        rows.iter().map(row_to_change_entry).collect()
    }

    async fn list_versions(&self, task_id: i64) -> Result<Vec<TaskVersion>> {
        let rows = sqlx::query("SELECT * FROM task_versions WHERE task_id = ? ORDER BY version_number ASC")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        rows.iter().map(row_to_task_version).collect()
    }

    async fn get_version(&self, task_id: i64, version_number: i64) -> Result<Option<TaskVersion>> {
        let row = sqlx::query("SELECT * FROM task_versions WHERE task_id = ? AND version_number = ?")
            .bind(task_id)
            .bind(version_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        row.as_ref().map(row_to_task_version).transpose()
    }

    async fn latest_version(&self, task_id: i64) -> Result<Option<TaskVersion>> {
        let row = sqlx::query("SELECT * FROM task_versions WHERE task_id = ? ORDER BY version_number DESC LIMIT 1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        row.as_ref().map(row_to_task_version).transpose()
    }

    async fn activity_feed(&self, filter: &ActivityFeedFilter) -> Result<Vec<ActivityEntry>> {
        let mut changes_qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM change_entries WHERE 1 = 1");
        if let Some(task_id) = filter.task_id {
            changes_qb.push(" AND task_id = ").push_bind(task_id);
        }
        if let Some(ref agent_id) = filter.agent_id {
            changes_qb.push(" AND agent_id = ").push_bind(agent_id.clone());
        }
        if let Some(start) = filter.start {
            changes_qb.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            changes_qb.push(" AND created_at <= ").push_bind(end);
        }
        changes_qb.push(" ORDER BY created_at DESC, id DESC LIMIT ").push_bind(filter.limit as i64);
        let change_rows = changes_qb.build().fetch_all(&self.pool).await.map_err(sqlx_error_to_task_error)?;
        let changes: Result<Vec<ChangeEntry>> = change_rows.iter().map(row_to_change_entry).collect();
        let changes = changes?;

        let mut updates_qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM updates WHERE 1 = 1");
        if let Some(task_id) = filter.task_id {
            updates_qb.push(" AND task_id = ").push_bind(task_id);
        }
        if let Some(ref agent_id) = filter.agent_id {
            updates_qb.push(" AND agent_id = ").push_bind(agent_id.clone());
        }
        if let Some(start) = filter.start {
            updates_qb.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            updates_qb.push(" AND created_at <= ").push_bind(end);
        }
        updates_qb.push(" ORDER BY created_at DESC, id DESC LIMIT ").push_bind(filter.limit as i64);
        let update_rows = updates_qb.build().fetch_all(&self.pool).await.map_err(sqlx_error_to_task_error)?;
        let updates: Result<Vec<Update>> = update_rows.iter().map(row_to_update).collect();
        let updates = updates?;

        let mut merged: Vec<ActivityEntry> = changes
            .into_iter()
            .map(ActivityEntry::Change)
            .chain(updates.into_iter().map(ActivityEntry::Update))
            .collect();
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
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO relationships (parent_task_id, child_task_id, relationship_type, created_at, created_by) VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(parent_task_id)
        .bind(child_task_id)
        .bind(relationship_type.to_string())
        .bind(now)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_task_error)?;

        let row = sqlx::query("SELECT * FROM relationships WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        row_to_relationship(&row)
    }

    async fn relationships_touching(&self, task_ids: &[i64]) -> Result<Vec<Relationship>> {
        if task_ids.is_empty() {
            return Ok(vec![]);
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM relationships WHERE parent_task_id IN (");
        let mut sep = qb.separated(", ");
        for id in task_ids {
            sep.push_bind(*id);
        }
        qb.push(") OR child_task_id IN (");
        let mut sep = qb.separated(", ");
        for id in task_ids {
            sep.push_bind(*id);
        }
        qb.push(")");
        let rows = qb.build().fetch_all(&self.pool).await.map_err(sqlx_error_to_task_error)?;
        rows.iter().map(row_to_relationship).collect()
    }

    /// `blocked_by` edges key on the candidate being `parent_task_id`, the
    /// blocker being `child_task_id`; `blocking` edges are the mirror image
    /// (blocker `parent_task_id`, candidate `child_task_id`) — see the
    /// direction normalization in the Dependency Resolver's cycle guard.
    async fn direct_blockers(&self, task_ids: &[i64]) -> Result<Vec<(i64, Relationship, TaskStatus)>> {
        if task_ids.is_empty() {
            return Ok(vec![]);
        }
        let mut out = Vec::new();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT r.id, r.parent_task_id, r.child_task_id, r.relationship_type, r.created_at, r.created_by, other.task_status AS other_status \
             FROM relationships r JOIN tasks other ON other.id = r.child_task_id \
             WHERE r.relationship_type = 'blocked_by' AND r.parent_task_id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in task_ids {
            sep.push_bind(*id);
        }
        qb.push(")");
        let rows = qb.build().fetch_all(&self.pool).await.map_err(sqlx_error_to_task_error)?;
        for row in &rows {
            let rel = row_to_relationship(row)?;
            let status: String = row.get("other_status");
            let status: TaskStatus = status
                .parse()
                .map_err(|_| TaskError::Fatal(format!("corrupt task_status value in row: {status}")))?;
            out.push((rel.parent_task_id, rel, status));
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT r.id, r.parent_task_id, r.child_task_id, r.relationship_type, r.created_at, r.created_by, other.task_status AS other_status \
             FROM relationships r JOIN tasks other ON other.id = r.parent_task_id \
             WHERE r.relationship_type = 'blocking' AND r.child_task_id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in task_ids {
            sep.push_bind(*id);
        }
        qb.push(")");
        let rows = qb.build().fetch_all(&self.pool).await.map_err(sqlx_error_to_task_error)?;
        for row in &rows {
            let rel = row_to_relationship(row)?;
            let status: String = row.get("other_status");
            let status: TaskStatus = status
                .parse()
                .map_err(|_| TaskError::Fatal(format!("corrupt task_status value in row: {status}")))?;
            out.push((rel.child_task_id, rel, status));
        }

        Ok(out)
    }

    async fn subtask_children(&self, parent_ids: &[i64]) -> Result<Vec<(i64, i64, TaskStatus)>> {
        if parent_ids.is_empty() {
            return Ok(vec![]);
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT r.parent_task_id, r.child_task_id, t.task_status FROM relationships r \
             JOIN tasks t ON t.id = r.child_task_id \
             WHERE r.relationship_type = 'subtask' AND r.parent_task_id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in parent_ids {
            sep.push_bind(*id);
        }
        qb.push(")");
        let rows = qb.build().fetch_all(&self.pool).await.map_err(sqlx_error_to_task_error)?;
        rows.iter()
            .map(|row| {
                let parent: i64 = row.get("parent_task_id");
                let child: i64 = row.get("child_task_id");
                let status: String = row.get("task_status");
                let status: TaskStatus = status
                    .parse()
                    .map_err(|_| TaskError::Fatal(format!("corrupt task_status value in row: {status}")))?;
                Ok((parent, child, status))
            })
            .collect()
    }

    // ---- Tags -----------------------------------------------------------------

    async fn get_or_create_tag(&self, name: &str) -> Result<Tag> {
        if let Some(row) = sqlx::query("SELECT * FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?
        {
            return row_to_tag(&row);
        }
        let id: i64 = sqlx::query_scalar("INSERT INTO tags (name) VALUES (?) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        Ok(Tag { id, name: name.to_string() })
    }

    async fn list_tags(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT * FROM tags ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        rows.iter().map(row_to_tag).collect()
    }

    async fn assign_tag(&self, task_id: i64, tag_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO task_tags (task_id, tag_id) VALUES (?, ?)")
            .bind(task_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        Ok(())
    }

    async fn remove_tag(&self, task_id: i64, tag_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM task_tags WHERE task_id = ? AND tag_id = ?")
            .bind(task_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        Ok(())
    }

    async fn list_task_tags(&self, task_id: i64) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            "SELECT tags.* FROM tags JOIN task_tags ON task_tags.tag_id = tags.id WHERE task_tags.task_id = ? ORDER BY tags.name ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_error_to_task_error)?;
        rows.iter().map(row_to_tag).collect()
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
        let mentions_json = serde_json::to_string(&mentions)
            .map_err(|e| TaskError::Fatal(format!("mentions serialize failed: {e}")))?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO comments (task_id, agent_id, content, parent_comment_id, mentions, created_at) VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(task_id)
        .bind(agent_id)
        .bind(&content)
        .bind(parent_comment_id)
        .bind(&mentions_json)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_error_to_task_error)?;

        self.get_comment(id)
            .await?
            .ok_or_else(|| TaskError::Fatal("comment vanished immediately after insert".into()))
    }

    async fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        let row = sqlx::query("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        row.as_ref().map(row_to_comment).transpose()
    }

    async fn update_comment(&self, id: i64, agent_id: &str, content: String, now: DateTime<Utc>) -> Result<Comment> {
        let existing = self.get_comment(id).await?.ok_or_else(|| TaskError::not_found("comment", id))?;
        if existing.agent_id != agent_id {
            return Err(TaskError::NotAssigned(format!("agent {agent_id} is not the author of comment {id}")));
        }
        sqlx::query("UPDATE comments SET content = ?, updated_at = ? WHERE id = ?")
            .bind(&content)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        self.get_comment(id)
            .await?
            .ok_or_else(|| TaskError::Fatal("comment vanished immediately after update".into()))
    }

    async fn delete_comment(&self, id: i64, agent_id: &str) -> Result<()> {
        let existing = self.get_comment(id).await?.ok_or_else(|| TaskError::not_found("comment", id))?;
        if existing.agent_id != agent_id {
            return Err(TaskError::NotAssigned(format!("agent {agent_id} is not the author of comment {id}")));
        }
        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        Ok(())
    }

    async fn list_comments(&self, task_id: i64) -> Result<Vec<Comment>> {
        let rows = sqlx::query("SELECT * FROM comments WHERE task_id = ? ORDER BY created_at ASC")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_error_to_task_error)?;
        rows.iter().map(row_to_comment).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use task_core::models::{Priority, TaskType};

    async fn fresh_store() -> SqliteStore {
        let store = SqliteStore::new(":memory:").await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn new_task(title: &str) -> NewTaskInput {
        NewTaskInput {
            project_id: None,
            task_type: TaskType::Concrete,
            priority: Priority::Medium,
            title: title.into(),
            task_instruction: "do the thing".into(),
            verification_instruction: "check the thing".into(),
            notes: None,
            estimated_hours: None,
            due_date: None,
            created_by: "a1".into(),
        }
    }

    #[tokio::test]
    async fn create_then_reserve_records_version_and_change_log() {
        let store = fresh_store().await;
        let task = store.create_task(new_task("impl x")).await.unwrap();
        assert_eq!(task.task_status, TaskStatus::Available);

        let reserved = store.reserve_task(task.id, "a1", Utc::now()).await.unwrap();
        assert_eq!(reserved.task_status, TaskStatus::InProgress);
        assert_eq!(reserved.assigned_agent.as_deref(), Some("a1"));

        let versions = store.list_versions(task.id).await.unwrap();
        assert_eq!(versions.len(), 2);
        let changes = store
            .list_change_entries(&ChangeEntryFilter { task_id: Some(task.id), ..Default::default() })
            .await
            .unwrap();
        assert!(changes.iter().any(|c| c.field_name == "assigned_agent"));
    }

    #[tokio::test]
    async fn second_reservation_is_rejected() {
        let store = fresh_store().await;
        let task = store.create_task(new_task("impl x")).await.unwrap();
        store.reserve_task(task.id, "a1", Utc::now()).await.unwrap();
        let err = store.reserve_task(task.id, "a2", Utc::now()).await.unwrap_err();
        assert_eq!(err.kind(), "Unavailable");
    }

    #[tokio::test]
    async fn complete_then_complete_again_acts_as_verify() {
        let store = fresh_store().await;
        let task = store.create_task(new_task("impl x")).await.unwrap();
        store.reserve_task(task.id, "a1", Utc::now()).await.unwrap();
        let (done, was_verify) = store.complete_task(task.id, "a1", None, Some(1.5), Utc::now()).await.unwrap();
        assert!(!was_verify);
        assert_eq!(done.task_status, TaskStatus::Complete);
        assert_eq!(done.verification_status, VerificationStatus::Unverified);

        let (verified, was_verify) = store.complete_task(task.id, "a1", None, None, Utc::now()).await.unwrap();
        assert!(was_verify);
        assert_eq!(verified.verification_status, VerificationStatus::Verified);
    }

    #[tokio::test]
    async fn bulk_unlock_is_all_or_nothing() {
        let store = fresh_store().await;
        let t1 = store.create_task(new_task("a")).await.unwrap();
        let t2 = store.create_task(new_task("b")).await.unwrap();
        store.reserve_task(t1.id, "a1", Utc::now()).await.unwrap();
        // t2 is never reserved, so unlocking it for a1 must fail and the
        // whole batch (including the valid t1 unlock) must roll back.
        let outcomes = store.bulk_unlock_tasks(&[t1.id, t2.id], "a1", Utc::now()).await.unwrap();
        assert!(outcomes.iter().all(|o| !o.ok));

        let still_in_progress = store.get_task(t1.id).await.unwrap().unwrap();
        assert_eq!(still_in_progress.task_status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn search_matches_title_and_instruction() {
        let store = fresh_store().await;
        store.create_task(new_task("payment refactor")).await.unwrap();
        store.create_task(new_task("unrelated")).await.unwrap();
        let hits = store.search_tasks("payment", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
