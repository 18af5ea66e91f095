use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BackgroundCheckRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub consultant_name: String,
    pub personal_id: String,
    pub purpose: Option<String>,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub provider_id: Option<String>,
    pub created_at: DateTime<Utc>,
}
