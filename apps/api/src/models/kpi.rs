use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Kpi {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub value: f64,
    pub target: Option<f64>,
    pub period: String,
    pub created_at: DateTime<Utc>,
}
