//! Expiry and deletion notifications.
//!
//! A notification carries a snapshot of the affected timer. Live delivery
//! is ephemeral; for offline subscribers the same payload is persisted to
//! the notification store and cleared on read.

use serde::{Deserialize, Serialize};

use super::{Timer, TimerId, UserId};

/// What happened to the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "notification_expired")]
    Expired,
    #[serde(rename = "notification_delete")]
    Delete,
}

/// A notification about one timer, delivered to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub timer: Timer,
}

impl Notification {
    pub const fn expired(timer: Timer) -> Self {
        Self {
            kind: NotificationKind::Expired,
            timer,
        }
    }

    pub const fn delete(timer: Timer) -> Self {
        Self {
            kind: NotificationKind::Delete,
            timer,
        }
    }

    pub const fn timer_id(&self) -> TimerId {
        self.timer.id
    }
}

/// A notification mirrored to external-service (relay) streams, annotated
/// with the subscribers that were offline at delivery time so the relay can
/// reach them out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSubscribers {
    #[serde(flatten)]
    pub notification: Notification,
    pub subscribers: Vec<UserId>,
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{TimerColor, TimerKind};
    use uuid::Uuid;

    fn timer() -> Timer {
        Timer {
            id: Uuid::new_v4(),
            utc_offset: 0,
            creator: 9,
            end_time: 300,
            pause_time: 0,
            kind: TimerKind::Countdown,
            name: "eggs".into(),
            description: String::new(),
            color: TimerColor::Yellow,
            with_music: false,
            duration: 300,
            is_paused: false,
        }
    }

    #[test]
    fn notification_wire_tags() {
        let n = Notification::expired(timer());
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "notification_expired");
        assert_eq!(json["timer"]["name"], "eggs");
    }

    #[test]
    fn annotated_notification_carries_offline_users() {
        let n = NotificationSubscribers {
            notification: Notification::delete(timer()),
            subscribers: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "notification_delete");
        assert_eq!(json["subscribers"], serde_json::json!([1, 2, 3]));
    }
}
