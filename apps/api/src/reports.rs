//! Dashboard read models: summary counts, KPIs, assignments.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::assignment::Assignment;
use crate::models::kpi::Kpi;
use crate::models::task::TaskStatus;
use crate::routes::UserIdQuery;
use crate::state::AppState;

const RECENT_CALL_DAYS: i32 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub consultants: i64,
    pub tasks_by_status: BTreeMap<String, i64>,
    pub open_tasks: i64,
    pub calls_last_30_days: i64,
    pub cached_emails: i64,
    pub unread_emails: i64,
}

impl ReportSummary {
    fn from_counts(
        consultants: i64,
        task_counts: Vec<(String, i64)>,
        calls: i64,
        emails: (i64, i64),
    ) -> Self {
        let open_tasks = task_counts
            .iter()
            .filter(|(status, _)| !TaskStatus::from(status.as_str()).is_terminal())
            .map(|(_, n)| n)
            .sum();
        Self {
            consultants,
            tasks_by_status: task_counts.into_iter().collect(),
            open_tasks,
            calls_last_30_days: calls,
            cached_emails: emails.0,
            unread_emails: emails.1,
        }
    }
}

pub async fn summary(pool: &PgPool, user_id: Uuid) -> Result<ReportSummary, sqlx::Error> {
    let consultants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM consultants WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    let task_counts: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM tasks WHERE user_id = $1 GROUP BY status",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let calls: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM call_records
        WHERE user_id = $1 AND created_at >= now() - make_interval(days => $2)
        "#,
    )
    .bind(user_id)
    .bind(RECENT_CALL_DAYS)
    .fetch_one(pool)
    .await?;

    let emails: (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*), COUNT(*) FILTER (WHERE NOT is_read)
        FROM outlook_emails WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(ReportSummary::from_counts(consultants, task_counts, calls, emails))
}

#[derive(Debug, Deserialize)]
pub struct KpiQuery {
    pub user_id: Uuid,
    pub period: Option<String>,
}

pub async fn list_kpis(
    pool: &PgPool,
    user_id: Uuid,
    period: Option<&str>,
) -> Result<Vec<Kpi>, sqlx::Error> {
    sqlx::query_as::<_, Kpi>(
        r#"
        SELECT * FROM kpis
        WHERE user_id = $1 AND ($2::text IS NULL OR period = $2)
        ORDER BY period DESC, name ASC
        "#,
    )
    .bind(user_id)
    .bind(period)
    .fetch_all(pool)
    .await
}

pub async fn list_assignments(pool: &PgPool, user_id: Uuid) -> Result<Vec<Assignment>, sqlx::Error> {
    sqlx::query_as::<_, Assignment>(
        "SELECT * FROM assignments WHERE user_id = $1 ORDER BY start_date DESC NULLS LAST",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// GET /api/v1/reports/summary
pub async fn handle_summary(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<ReportSummary>, AppError> {
    Ok(Json(summary(&state.db, params.user_id).await?))
}

/// GET /api/v1/kpis
pub async fn handle_list_kpis(
    State(state): State<AppState>,
    Query(params): Query<KpiQuery>,
) -> Result<Json<Vec<Kpi>>, AppError> {
    let kpis = list_kpis(&state.db, params.user_id, params.period.as_deref()).await?;
    Ok(Json(kpis))
}

/// GET /api/v1/assignments
pub async fn handle_list_assignments(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<Assignment>>, AppError> {
    Ok(Json(list_assignments(&state.db, params.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_tasks_excludes_klar() {
        let summary = ReportSummary::from_counts(
            3,
            vec![
                ("brådskande".into(), 2),
                ("väntar".into(), 4),
                ("klar".into(), 10),
                ("arkiverad".into(), 1),
            ],
            7,
            (20, 5),
        );
        assert_eq!(summary.open_tasks, 7);
        assert_eq!(summary.tasks_by_status["klar"], 10);
        assert_eq!(summary.calls_last_30_days, 7);
        assert_eq!(summary.unread_emails, 5);
    }

    #[test]
    fn test_empty_summary() {
        let summary = ReportSummary::from_counts(0, vec![], 0, (0, 0));
        assert_eq!(summary.open_tasks, 0);
        assert!(summary.tasks_by_status.is_empty());
    }
}
