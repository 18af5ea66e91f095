use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::template::EmailTemplate;

#[derive(Debug, Deserialize)]
pub struct NewTemplate {
    pub user_id: Uuid,
    pub name: String,
    pub subject: Option<String>,
    pub category: Option<String>,
    pub content: String,
}

/// Most used first, then by name.
pub async fn list_templates(pool: &PgPool, user_id: Uuid) -> Result<Vec<EmailTemplate>, sqlx::Error> {
    sqlx::query_as::<_, EmailTemplate>(
        "SELECT * FROM email_templates WHERE user_id = $1 ORDER BY usage_count DESC, name ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn create_template(pool: &PgPool, new: &NewTemplate) -> Result<EmailTemplate, sqlx::Error> {
    sqlx::query_as::<_, EmailTemplate>(
        r#"
        INSERT INTO email_templates (user_id, name, subject, category, content)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(new.user_id)
    .bind(new.name.trim())
    .bind(&new.subject)
    .bind(&new.category)
    .bind(&new.content)
    .fetch_one(pool)
    .await
}

/// Bumps the usage counter and stamps `last_used_at` in one statement.
pub async fn record_template_use(
    pool: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> Result<Option<EmailTemplate>, sqlx::Error> {
    sqlx::query_as::<_, EmailTemplate>(
        r#"
        UPDATE email_templates
        SET usage_count = usage_count + 1, last_used_at = now()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub async fn delete_template(pool: &PgPool, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM email_templates WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
