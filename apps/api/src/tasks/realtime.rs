//! Row-level change feed for `tasks`.
//!
//! Postgres publishes every insert/update/delete on the `task_changes`
//! channel as a bounded `TaskSnapshot` (see the task change migrations), so
//! long descriptions never push the payload past the 8000 byte NOTIFY limit.
//! `run_task_listener` feeds
//! those into a `TaskFeed`; `forward_notifications` turns each change into
//! exactly one user notification.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::task::{Task, TaskStatus};
use crate::notifications::{Notification, NotificationBus};

pub const CHANNEL: &str = "task_changes";
const FEED_CAPACITY: usize = 256;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Postgres caps NOTIFY payloads at this many bytes.
pub const MAX_PAYLOAD_BYTES: usize = 8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// The fields of a task row carried on the change channel. Title and status
/// are truncated by the trigger (200 and 64 characters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub status: String,
}

impl TaskSnapshot {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from(self.status.as_str())
    }
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            user_id: task.user_id,
            title: task.title.clone(),
            status: task.status.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskChange {
    pub kind: ChangeKind,
    pub new: Option<TaskSnapshot>,
    pub old: Option<TaskSnapshot>,
}

impl TaskChange {
    pub fn user_id(&self) -> Option<Uuid> {
        self.new.as_ref().or(self.old.as_ref()).map(|t| t.user_id)
    }
}

pub fn notification_for(change: &TaskChange) -> Option<Notification> {
    match change.kind {
        ChangeKind::Insert => change.new.as_ref().map(|task| {
            Notification::success("Ny uppgift skapad", format!("\"{}\" har lagts till", task.title))
        }),
        ChangeKind::Update => {
            let task = change.new.as_ref()?;
            let was_done = change
                .old
                .as_ref()
                .is_some_and(|old| old.status().is_terminal());
            if task.status().is_terminal() && !was_done {
                Some(Notification::success(
                    "Uppgift slutförd",
                    format!("\"{}\" är klar", task.title),
                ))
            } else {
                Some(Notification::info(
                    "Uppgift uppdaterad",
                    format!("\"{}\" har uppdaterats", task.title),
                ))
            }
        }
        ChangeKind::Delete => change.old.as_ref().map(|task| {
            Notification::info("Uppgift borttagen", format!("\"{}\" har tagits bort", task.title))
        }),
    }
}

#[derive(Clone)]
pub struct TaskFeed {
    tx: broadcast::Sender<TaskChange>,
}

impl Default for TaskFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, change: TaskChange) {
        let _ = self.tx.send(change);
    }

    /// Every change, regardless of owner.
    pub fn subscribe_all(&self) -> broadcast::Receiver<TaskChange> {
        self.tx.subscribe()
    }

    /// Changes to rows owned by `user_id`. Dropping the subscription ends it.
    pub fn subscribe(&self, user_id: Uuid) -> TaskSubscription {
        TaskSubscription {
            user_id,
            rx: self.tx.subscribe(),
        }
    }
}

pub struct TaskSubscription {
    user_id: Uuid,
    rx: broadcast::Receiver<TaskChange>,
}

impl TaskSubscription {
    pub async fn recv(&mut self) -> Option<TaskChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.user_id() == Some(self.user_id) => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(user_id = %self.user_id, skipped, "Task subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Publishes Postgres task notifications into the feed. Runs until the
/// process exits; connect and receive errors are logged and retried.
pub async fn run_task_listener(pool: PgPool, feed: TaskFeed) -> Result<()> {
    let mut listener = loop {
        match connect_listener(&pool).await {
            Ok(listener) => break listener,
            Err(e) => {
                warn!("Task listener could not connect, retrying: {e}");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    };
    info!("Listening for task changes on '{CHANNEL}'");

    loop {
        match listener.recv().await {
            Ok(notification) => match serde_json::from_str::<TaskChange>(notification.payload()) {
                Ok(change) => {
                    debug!(kind = ?change.kind, "Task change received");
                    feed.publish(change);
                }
                Err(e) => warn!("Ignoring malformed task change payload: {e}"),
            },
            Err(e) => {
                warn!("Task listener error, retrying: {e}");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

async fn connect_listener(pool: &PgPool) -> Result<PgListener> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANNEL).await?;
    Ok(listener)
}

/// Turns each task change into one notification for the row's owner.
pub async fn forward_notifications(mut changes: broadcast::Receiver<TaskChange>, bus: NotificationBus) {
    loop {
        match changes.recv().await {
            Ok(change) => {
                if let (Some(user_id), Some(n)) = (change.user_id(), notification_for(&change)) {
                    bus.notify(user_id, n);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Task notification forwarder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationKind;
    use chrono::Utc;

    fn task(user_id: Uuid, title: &str, status: &str) -> TaskSnapshot {
        TaskSnapshot {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            status: status.to_string(),
        }
    }

    fn update(user: Uuid, from: &str, to: &str) -> TaskChange {
        TaskChange {
            kind: ChangeKind::Update,
            old: Some(task(user, "Ring kund", from)),
            new: Some(task(user, "Ring kund", to)),
        }
    }

    #[test]
    fn test_insert_notification_names_task() {
        let change = TaskChange {
            kind: ChangeKind::Insert,
            new: Some(task(Uuid::new_v4(), "Follow up", "väntar")),
            old: None,
        };
        let n = notification_for(&change).unwrap();
        assert_eq!(n.title, "Ny uppgift skapad");
        assert!(n.description.unwrap().contains("Follow up"));
    }

    #[test]
    fn test_transition_into_klar_is_completion() {
        let user = Uuid::new_v4();
        for from in ["brådskande", "pågående", "väntar"] {
            let n = notification_for(&update(user, from, "klar")).unwrap();
            assert_eq!(n.title, "Uppgift slutförd", "from {from}");
        }
    }

    #[test]
    fn test_other_updates_are_plain_updates() {
        let user = Uuid::new_v4();
        assert_eq!(
            notification_for(&update(user, "väntar", "pågående")).unwrap().title,
            "Uppgift uppdaterad"
        );
        assert_eq!(
            notification_for(&update(user, "klar", "klar")).unwrap().title,
            "Uppgift uppdaterad"
        );
        assert_eq!(
            notification_for(&update(user, "klar", "väntar")).unwrap().title,
            "Uppgift uppdaterad"
        );
    }

    #[test]
    fn test_delete_notification() {
        let change = TaskChange {
            kind: ChangeKind::Delete,
            new: None,
            old: Some(task(Uuid::new_v4(), "Gammal", "klar")),
        };
        assert_eq!(notification_for(&change).unwrap().title, "Uppgift borttagen");
    }

    #[test]
    fn test_trigger_payload_parses() {
        let user = Uuid::new_v4();
        let payload = format!(
            r#"{{"kind":"update",
                "new":{{"id":"{id}","user_id":"{user}","title":"Boka möte","status":"klar"}},
                "old":{{"id":"{id}","user_id":"{user}","title":"Boka möte","status":"väntar"}}}}"#,
            id = Uuid::new_v4(),
        );
        let change: TaskChange = serde_json::from_str(&payload).unwrap();
        assert_eq!(change.kind, ChangeKind::Update);
        assert_eq!(change.user_id(), Some(user));
        assert_eq!(notification_for(&change).unwrap().title, "Uppgift slutförd");
        assert!(change.new.unwrap().status().is_terminal());
    }

    #[test]
    fn test_snapshot_drops_description() {
        let row = Task {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Lång".to_string(),
            description: Some("x".repeat(20_000)),
            status: "väntar".to_string(),
            due_date: None,
            assignee: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&TaskSnapshot::from(&row)).unwrap();
        assert!(!json.contains("description"));
        assert!(json.len() < 200);
    }

    #[test]
    fn test_worst_case_update_payload_fits_notify_limit() {
        // Trigger limits: 200 title chars, 64 status chars. Control characters
        // are the costliest to encode in JSON.
        let user = Uuid::new_v4();
        let worst = TaskSnapshot {
            id: Uuid::new_v4(),
            user_id: user,
            title: "\u{1}".repeat(200),
            status: "\u{1}".repeat(64),
        };
        let change = TaskChange {
            kind: ChangeKind::Update,
            new: Some(worst.clone()),
            old: Some(worst),
        };
        let payload = serde_json::to_string(&change).unwrap();
        assert!(payload.len() < MAX_PAYLOAD_BYTES, "{} bytes", payload.len());
    }

    #[test]
    fn test_latest_trigger_publishes_snapshots() {
        let migration = include_str!("../../migrations/20240201000000_task_change_snapshot.sql");
        assert!(migration.contains("task_change_snapshot(NEW)"));
        assert!(migration.contains("task_change_snapshot(OLD)"));
        assert!(!migration.contains("row_to_json"));
    }

    #[tokio::test]
    async fn test_listener_keeps_retrying_when_database_is_down() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://luna@127.0.0.1:1/luna")
            .unwrap();

        let outcome =
            tokio::time::timeout(Duration::from_millis(2500), run_task_listener(pool, TaskFeed::new()))
                .await;
        assert!(outcome.is_err(), "listener gave up instead of retrying");
    }

    /// Needs a scratch database: `DATABASE_URL=... cargo test -- --ignored`.
    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_long_description_task_is_written_and_announced() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = crate::db::create_pool(&url).await.unwrap();

        let mut listener = PgListener::connect_with(&pool).await.unwrap();
        listener.listen(CHANNEL).await.unwrap();

        let user = Uuid::new_v4();
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO tasks (user_id, title, description) VALUES ($1, 'Lång', $2) RETURNING id",
        )
        .bind(user)
        .bind("x".repeat(10_000))
        .fetch_one(&pool)
        .await
        .unwrap();
        sqlx::query("UPDATE tasks SET status = 'klar' WHERE id = $1")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        let inserted: TaskChange =
            serde_json::from_str(listener.recv().await.unwrap().payload()).unwrap();
        assert_eq!(inserted.kind, ChangeKind::Insert);
        let updated: TaskChange =
            serde_json::from_str(listener.recv().await.unwrap().payload()).unwrap();
        assert_eq!(notification_for(&updated).unwrap().title, "Uppgift slutförd");

        sqlx::query("DELETE FROM tasks WHERE user_id = $1")
            .bind(user)
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_insert_event_notifies_exactly_once() {
        let feed = TaskFeed::new();
        let bus = NotificationBus::new();
        let user = Uuid::new_v4();
        let mut inbox = bus.subscribe(user);
        let forwarder = tokio::spawn(forward_notifications(feed.subscribe_all(), bus.clone()));

        feed.publish(TaskChange {
            kind: ChangeKind::Insert,
            new: Some(task(user, "Follow up", "väntar")),
            old: None,
        });

        let n = inbox.recv().await.unwrap();
        assert_eq!(n.title, "Ny uppgift skapad");
        assert_eq!(n.kind, NotificationKind::Success);
        assert!(n.description.unwrap().contains("Follow up"));

        let second = tokio::time::timeout(Duration::from_millis(50), inbox.recv()).await;
        assert!(second.is_err(), "expected a single notification");
        forwarder.abort();
    }

    #[tokio::test]
    async fn test_subscription_filters_by_owner() {
        let feed = TaskFeed::new();
        let me = Uuid::new_v4();
        let mut sub = feed.subscribe(me);

        feed.publish(TaskChange {
            kind: ChangeKind::Insert,
            new: Some(task(Uuid::new_v4(), "Inte min", "väntar")),
            old: None,
        });
        feed.publish(TaskChange {
            kind: ChangeKind::Insert,
            new: Some(task(me, "Min", "väntar")),
            old: None,
        });

        let change = sub.recv().await.unwrap();
        assert_eq!(change.new.unwrap().title, "Min");
    }
}
