//! User-facing notifications ("toasts"), fanned out per user.
//!
//! Producers (task feed, recording jobs) publish onto one broadcast bus;
//! each SSE client holds a `UserNotifications` receiver filtered to its user.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::routes::UserIdQuery;
use crate::state::AppState;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: Option<String>,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, title, Some(description.into()))
    }

    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationKind::Success, title, Some(description.into()))
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, title, Some(description.into()))
    }

    fn new(kind: NotificationKind, title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            description,
        }
    }
}

#[derive(Debug, Clone)]
struct Envelope {
    user_id: Uuid,
    notification: Notification,
}

#[derive(Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Envelope>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Delivers to every live subscriber of `user_id`. Having no subscribers is
    /// not an error.
    pub fn notify(&self, user_id: Uuid, notification: Notification) {
        let _ = self.tx.send(Envelope {
            user_id,
            notification,
        });
    }

    pub fn subscribe(&self, user_id: Uuid) -> UserNotifications {
        UserNotifications {
            user_id,
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving half scoped to one user. Dropping it unsubscribes.
pub struct UserNotifications {
    user_id: Uuid,
    rx: broadcast::Receiver<Envelope>,
}

impl UserNotifications {
    /// Waits for the next notification for this user. Returns `None` once the
    /// bus is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(env) if env.user_id == self.user_id => return Some(env.notification),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(user_id = %self.user_id, skipped, "Notification subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Notification> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|n| (n, sub))
        })
    }
}

/// GET /api/v1/notifications/stream
pub async fn handle_notification_stream(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    use futures::StreamExt;

    let stream = state
        .notifications
        .subscribe(params.user_id)
        .into_stream()
        .map(|n| {
            let event = Event::default()
                .event("notification")
                .json_data(&n)
                .unwrap_or_else(|_| Event::default().comment("unserializable notification"));
            Ok(event)
        });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_only_sees_own_notifications() {
        let bus = NotificationBus::new();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut sub = bus.subscribe(me);

        bus.notify(other, Notification::info("Annan", "x"));
        bus.notify(me, Notification::success("Min", "y"));

        let got = sub.recv().await.unwrap();
        assert_eq!(got.title, "Min");
        assert_eq!(got.kind, NotificationKind::Success);
    }

    #[test]
    fn test_notify_without_subscribers_is_silent() {
        let bus = NotificationBus::new();
        bus.notify(Uuid::new_v4(), Notification::error("Fel", "ingen lyssnar"));
    }
}
