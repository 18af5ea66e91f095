use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted consultant row. Contact details shown in the UI are not stored;
/// see `consultants::ConsultantView` for the derived block.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Consultant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub specialty: Option<String>,
    pub personal_id: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
