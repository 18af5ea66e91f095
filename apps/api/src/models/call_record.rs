use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CallRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub audio_url: Option<String>,
    pub transcription: Option<String>,
    pub action_plan: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
