use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A cached mailbox message. `message_id` is the provider's id and is unique
/// per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OutlookEmail {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message_id: String,
    pub subject: Option<String>,
    pub preview: Option<String>,
    pub sender: Option<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub status: String,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
