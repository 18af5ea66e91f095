pub mod handlers;
pub mod realtime;

use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::task::{Task, TaskStatus};

#[derive(Debug, Deserialize)]
pub struct NewTask {
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub assignee: Option<String>,
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct TaskUpdate {
    pub user_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub assignee: Option<String>,
}

impl NewTask {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".into());
        }
        Ok(())
    }
}

impl TaskUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err("title must not be empty".into());
        }
        if self.status.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err("status must not be empty".into());
        }
        Ok(())
    }
}

pub async fn list_tasks(
    pool: &PgPool,
    user_id: Uuid,
    status: Option<&TaskStatus>,
) -> Result<Vec<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        r#"
        SELECT * FROM tasks
        WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY due_date ASC NULLS LAST, created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(status.map(|s| s.as_str().to_string()))
    .fetch_all(pool)
    .await
}

pub async fn get_task(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn create_task(pool: &PgPool, new: &NewTask) -> Result<Task, sqlx::Error> {
    let status = new
        .status
        .as_deref()
        .map(TaskStatus::from)
        .unwrap_or(TaskStatus::Waiting);

    sqlx::query_as::<_, Task>(
        r#"
        INSERT INTO tasks (user_id, title, description, status, due_date, assignee)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(new.user_id)
    .bind(new.title.trim())
    .bind(&new.description)
    .bind(status.as_str())
    .bind(new.due_date)
    .bind(&new.assignee)
    .fetch_one(pool)
    .await
}

pub async fn update_task(
    pool: &PgPool,
    id: Uuid,
    update: &TaskUpdate,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks SET
            title       = COALESCE($3, title),
            description = COALESCE($4, description),
            status      = COALESCE($5, status),
            due_date    = COALESCE($6, due_date),
            assignee    = COALESCE($7, assignee),
            updated_at  = now()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(update.user_id)
    .bind(update.title.as_deref().map(str::trim))
    .bind(&update.description)
    .bind(update.status.as_deref().map(|s| TaskStatus::from(s).as_str().to_string()))
    .bind(update.due_date)
    .bind(&update.assignee)
    .fetch_optional(pool)
    .await
}

pub async fn delete_task(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_requires_title() {
        let task = NewTask {
            user_id: Uuid::new_v4(),
            title: "   ".into(),
            description: None,
            status: None,
            due_date: None,
            assignee: None,
        };
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_update_rejects_blank_fields_but_allows_omitted() {
        let user_id = Uuid::new_v4();
        assert!(TaskUpdate { user_id, ..Default::default() }.validate().is_ok());
        assert!(TaskUpdate {
            user_id,
            status: Some(" ".into()),
            ..Default::default()
        }
        .validate()
        .is_err());
        assert!(TaskUpdate {
            user_id,
            status: Some("klar".into()),
            ..Default::default()
        }
        .validate()
        .is_ok());
    }
}
