use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub assignee: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from(self.status.as_str())
    }
}

/// Task status. The set is open: unknown values stored by other clients are
/// kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Urgent,
    InProgress,
    Waiting,
    Done,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Urgent => "brådskande",
            TaskStatus::InProgress => "pågående",
            TaskStatus::Waiting => "väntar",
            TaskStatus::Done => "klar",
            TaskStatus::Other(s) => s,
        }
    }

    /// `klar` is the only terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl From<&str> for TaskStatus {
    fn from(s: &str) -> Self {
        match s {
            "brådskande" => TaskStatus::Urgent,
            "pågående" => TaskStatus::InProgress,
            "väntar" => TaskStatus::Waiting,
            "klar" => TaskStatus::Done,
            other => TaskStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
