//! Timer lifecycle events.
//!
//! Events are ephemeral: they are published once by the coordinator and
//! consumed by every event stream currently subscribed to the timer.

use serde::{Deserialize, Serialize};

use super::{TimerId, TimerSettings};

/// A lifecycle event for one timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerEvent {
    #[serde(rename = "event_start")]
    Start {
        #[serde(rename = "timerId")]
        timer_id: TimerId,
        #[serde(rename = "endTime")]
        end_time: i64,
    },
    #[serde(rename = "event_stop")]
    Stop {
        #[serde(rename = "timerId")]
        timer_id: TimerId,
        #[serde(rename = "pauseTime")]
        pause_time: i64,
    },
    #[serde(rename = "event_reset")]
    Reset {
        #[serde(rename = "timerId")]
        timer_id: TimerId,
        #[serde(rename = "endTime")]
        end_time: i64,
    },
    #[serde(rename = "event_update")]
    Update {
        #[serde(rename = "timerId")]
        timer_id: TimerId,
        #[serde(flatten)]
        settings: TimerSettings,
    },
}

impl TimerEvent {
    /// The timer this event belongs to; the bus routes on this id.
    pub const fn timer_id(&self) -> TimerId {
        match self {
            Self::Start { timer_id, .. }
            | Self::Stop { timer_id, .. }
            | Self::Reset { timer_id, .. }
            | Self::Update { timer_id, .. } => *timer_id,
        }
    }
}

/// Client-originated interest control: add or remove timers from a live
/// event stream. Consumed by the transport layer, which translates it into
/// `EventStream::subscribe`/`unsubscribe` calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamCommand {
    #[serde(rename = "event_subscribe")]
    Subscribe {
        #[serde(rename = "timerIds")]
        timer_ids: Vec<TimerId>,
    },
    #[serde(rename = "event_unsubscribe")]
    Unsubscribe {
        #[serde(rename = "timerIds")]
        timer_ids: Vec<TimerId>,
    },
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::TimerColor;
    use uuid::Uuid;

    #[test]
    fn event_wire_tags() {
        let id = Uuid::new_v4();
        let stop = TimerEvent::Stop {
            timer_id: id,
            pause_time: 123,
        };
        let json = serde_json::to_value(&stop).unwrap();
        assert_eq!(json["type"], "event_stop");
        assert_eq!(json["pauseTime"], 123);
        assert_eq!(stop.timer_id(), id);
    }

    #[test]
    fn update_event_flattens_settings() {
        let event = TimerEvent::Update {
            timer_id: Uuid::nil(),
            settings: TimerSettings {
                name: "tea".into(),
                description: String::new(),
                color: TimerColor::Green,
                with_music: false,
                end_time: 500,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "event_update");
        assert_eq!(json["name"], "tea");
        assert_eq!(json["endTime"], 500);
    }

    #[test]
    fn stream_command_roundtrip() {
        let cmd = StreamCommand::Subscribe {
            timer_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: StreamCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }
}
