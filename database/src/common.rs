//! Row <-> model conversions and the dynamic filter query builder.
//!
//! SQLite stores every enum as its `Display` string and every timestamp as
//! an RFC3339 `TEXT` column (sqlx's chrono feature encodes `DateTime<Utc>`
//! that way transparently). Mapping panics are avoided: a row shape that
//! doesn't parse is a `TaskError::Fatal`, matching §7's "corruption detected
//! during a read."

use std::str::FromStr;

use sqlx::{sqlite::SqliteRow, Row};
use task_core::error::{Result, TaskError};
use task_core::models::{
    ChangeEntry, Comment, Priority, Project, Relationship, RelationshipType, Tag, Task,
    TaskStatus, TaskType, TaskVersion, Update, UpdateType, VerificationStatus,
};
use task_core::store::{OrderBy, TaskFilter};

fn parse_field<T: FromStr>(field: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| TaskError::Fatal(format!("corrupt {field} value in row: {raw}")))
}

pub fn row_to_project(row: &SqliteRow) -> Result<Project> {
    Ok(Project {
        id: row.get("id"),
        name: row.get("name"),
        local_path_hint: row.get("local_path_hint"),
        origin_url: row.get("origin_url"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let task_type: String = row.get("task_type");
    let priority: String = row.get("priority");
    let task_status: String = row.get("task_status");
    let verification_status: String = row.get("verification_status");
    Ok(Task {
        id: row.get("id"),
        project_id: row.get("project_id"),
        task_type: parse_field::<TaskType>("task_type", &task_type)?,
        priority: parse_field::<Priority>("priority", &priority)?,
        title: row.get("title"),
        task_instruction: row.get("task_instruction"),
        verification_instruction: row.get("verification_instruction"),
        notes: row.get("notes"),
        assigned_agent: row.get("assigned_agent"),
        assigned_at: row.get("assigned_at"),
        task_status: parse_field::<TaskStatus>("task_status", &task_status)?,
        verification_status: parse_field::<VerificationStatus>(
            "verification_status",
            &verification_status,
        )?,
        estimated_hours: row.get("estimated_hours"),
        actual_hours: row.get("actual_hours"),
        due_date: row.get("due_date"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
        github_issue_url: row.get("github_issue_url"),
        github_pr_url: row.get("github_pr_url"),
    })
}

pub fn row_to_relationship(row: &SqliteRow) -> Result<Relationship> {
    let rel_type: String = row.get("relationship_type");
    Ok(Relationship {
        id: row.get("id"),
        parent_task_id: row.get("parent_task_id"),
        child_task_id: row.get("child_task_id"),
        relationship_type: parse_field::<RelationshipType>("relationship_type", &rel_type)?,
        created_at: row.get("created_at"),
        created_by: row.get("created_by"),
    })
}

pub fn row_to_tag(row: &SqliteRow) -> Result<Tag> {
    Ok(Tag {
        id: row.get("id"),
        name: row.get("name"),
    })
}

pub fn row_to_update(row: &SqliteRow) -> Result<Update> {
    let update_type: String = row.get("update_type");
    let metadata: Option<String> = row.get("metadata");
    Ok(Update {
        id: row.get("id"),
        task_id: row.get("task_id"),
        agent_id: row.get("agent_id"),
        update_type: parse_field::<UpdateType>("update_type", &update_type)?,
        content: row.get("content"),
        metadata: metadata
            .map(|m| serde_json::from_str(&m))
            .transpose()
            .map_err(|e| TaskError::Fatal(format!("corrupt update metadata json: {e}")))?,
        created_at: row.get("created_at"),
    })
}

pub fn row_to_change_entry(row: &SqliteRow) -> Result<ChangeEntry> {
    Ok(ChangeEntry {
        id: row.get("id"),
        task_id: row.get("task_id"),
        agent_id: row.get("agent_id"),
        change_type: row.get("change_type"),
        field_name: row.get("field_name"),
        old_value: row.get("old_value"),
        new_value: row.get("new_value"),
        created_at: row.get("created_at"),
    })
}

pub fn row_to_task_version(row: &SqliteRow) -> Result<TaskVersion> {
    let snapshot_json: String = row.get("snapshot");
    let snapshot: Task = serde_json::from_str(&snapshot_json)
        .map_err(|e| TaskError::Fatal(format!("corrupt task version snapshot json: {e}")))?;
    Ok(TaskVersion {
        task_id: row.get("task_id"),
        version_number: row.get("version_number"),
        snapshot,
        created_at: row.get("created_at"),
    })
}

pub fn row_to_comment(row: &SqliteRow) -> Result<Comment> {
    let mentions_json: String = row.get("mentions");
    let mentions: Vec<String> = serde_json::from_str(&mentions_json)
        .map_err(|e| TaskError::Fatal(format!("corrupt comment mentions json: {e}")))?;
    Ok(Comment {
        id: row.get("id"),
        task_id: row.get("task_id"),
        agent_id: row.get("agent_id"),
        content: row.get("content"),
        parent_comment_id: row.get("parent_comment_id"),
        mentions,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// Maps a raw sqlx failure onto the abstract error kinds of §7.
/// `SQLITE_BUSY`/`SQLITE_LOCKED` become `TransactionAborted` (retryable);
/// unique-constraint violations become `Conflict`; anything else reaching
/// this function indicates a schema or connectivity problem, i.e. `Fatal`.
pub fn sqlx_error_to_task_error(err: sqlx::Error) -> TaskError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            if message.contains("UNIQUE constraint failed") {
                TaskError::Conflict(message)
            } else if code == "5" || code == "6" || message.contains("database is locked") {
                TaskError::TransactionAborted(message)
            } else {
                TaskError::Fatal(format!("database constraint error: {message}"))
            }
        }
        sqlx::Error::PoolTimedOut => TaskError::TransactionAborted("connection pool timeout".into()),
        sqlx::Error::RowNotFound => TaskError::Fatal("unexpected missing row".into()),
        other => TaskError::Fatal(format!("database operation failed: {other}")),
    }
}

/// `SELECT ... FROM tasks` plus the dynamic `WHERE`/`ORDER BY`/`LIMIT`
/// clauses implied by `filter`, using bound parameters throughout.
pub fn build_filter_query(filter: &TaskFilter) -> sqlx::QueryBuilder<'_, sqlx::Sqlite> {
    let mut qb: sqlx::QueryBuilder<sqlx::Sqlite> = sqlx::QueryBuilder::new(
        "SELECT DISTINCT tasks.* FROM tasks",
    );

    if filter.tag_id.is_some() || filter.tag_ids.is_some() {
        qb.push(" JOIN task_tags ON task_tags.task_id = tasks.id");
    }

    let mut has_conditions = false;
    macro_rules! clause {
        () => {{
            if has_conditions {
                qb.push(" AND ");
            } else {
                qb.push(" WHERE ");
                has_conditions = true;
            }
        }};
    }

    if let Some(project_id) = filter.project_id {
        clause!();
        qb.push("tasks.project_id = ");
        qb.push_bind(project_id);
    }
    if let Some(task_type) = filter.task_type {
        clause!();
        qb.push("tasks.task_type = ");
        qb.push_bind(task_type.to_string());
    }
    if let Some(ref task_types) = filter.task_types {
        if !task_types.is_empty() {
            clause!();
            qb.push("tasks.task_type IN (");
            let mut sep = qb.separated(", ");
            for tt in task_types {
                sep.push_bind(tt.to_string());
            }
            qb.push(")");
        }
    }
    if let Some(task_status) = filter.task_status {
        clause!();
        qb.push("tasks.task_status = ");
        qb.push_bind(task_status.to_string());
    }
    if let Some(ref agent) = filter.assigned_agent {
        clause!();
        qb.push("tasks.assigned_agent = ");
        qb.push_bind(agent.clone());
    }
    if let Some(priority) = filter.priority {
        clause!();
        qb.push("tasks.priority = ");
        qb.push_bind(priority.to_string());
    }
    if let Some(tag_id) = filter.tag_id {
        clause!();
        qb.push("task_tags.tag_id = ");
        qb.push_bind(tag_id);
    }
    if let Some(created_after) = filter.created_after {
        clause!();
        qb.push("tasks.created_at >= ");
        qb.push_bind(created_after);
    }
    if let Some(created_before) = filter.created_before {
        clause!();
        qb.push("tasks.created_at <= ");
        qb.push_bind(created_before);
    }
    if let Some(completed_after) = filter.completed_after {
        clause!();
        qb.push("tasks.completed_at >= ");
        qb.push_bind(completed_after);
    }
    if let Some(completed_before) = filter.completed_before {
        clause!();
        qb.push("tasks.completed_at <= ");
        qb.push_bind(completed_before);
    }

    // `tag_ids` requires ALL of the given tags: equivalent to a count of
    // matching task_tags rows equal to the number of requested tags.
    if let Some(ref ids) = filter.tag_ids {
        if !ids.is_empty() {
            clause!();
            qb.push("tasks.id IN (SELECT task_id FROM task_tags WHERE tag_id IN (");
            let mut sep = qb.separated(", ");
            for id in ids {
                sep.push_bind(*id);
            }
            qb.push(") GROUP BY task_id HAVING COUNT(DISTINCT tag_id) = ");
            qb.push_bind(ids.len() as i64);
            qb.push(")");
        }
    }

    let order_by = filter.order_by.unwrap_or(OrderBy::PriorityDesc);
    match order_by {
        OrderBy::PriorityDesc => qb.push(
            " ORDER BY CASE tasks.priority WHEN 'critical' THEN 3 WHEN 'high' THEN 2 WHEN 'medium' THEN 1 ELSE 0 END DESC, tasks.created_at ASC, tasks.id ASC",
        ),
        OrderBy::PriorityAsc => qb.push(
            " ORDER BY CASE tasks.priority WHEN 'critical' THEN 3 WHEN 'high' THEN 2 WHEN 'medium' THEN 1 ELSE 0 END ASC, tasks.created_at ASC, tasks.id ASC",
        ),
        OrderBy::CreatedAtAsc => qb.push(" ORDER BY tasks.created_at ASC, tasks.id ASC"),
        OrderBy::CreatedAtDesc => qb.push(" ORDER BY tasks.created_at DESC, tasks.id DESC"),
    };

    qb.push(" LIMIT ");
    qb.push_bind(filter.limit as i64);

    qb
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Execute;

    #[test]
    fn filter_query_binds_status_and_orders_by_priority() {
        let filter = TaskFilter {
            task_status: Some(TaskStatus::Available),
            limit: 50,
            ..Default::default()
        };
        let mut qb = build_filter_query(&filter);
        let query = qb.build();
        let sql = query.sql();
        assert!(sql.contains("WHERE tasks.task_status = "));
        assert!(sql.contains("ORDER BY CASE tasks.priority"));
        assert!(sql.contains("LIMIT"));
    }

    #[test]
    fn filter_query_with_tag_ids_requires_all() {
        let filter = TaskFilter {
            tag_ids: Some(vec![1, 2]),
            limit: 10,
            ..Default::default()
        };
        let mut qb = build_filter_query(&filter);
        let query = qb.build();
        assert!(query.sql().contains("HAVING COUNT(DISTINCT tag_id) = "));
    }

    #[test]
    fn filter_query_with_task_types_uses_in_clause() {
        let filter = TaskFilter {
            task_types: Some(vec![TaskType::Abstract, TaskType::Epic]),
            limit: 10,
            ..Default::default()
        };
        let mut qb = build_filter_query(&filter);
        let query = qb.build();
        assert!(query.sql().contains("tasks.task_type IN ("));
    }
}
