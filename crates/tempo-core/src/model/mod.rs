//! Timer domain models.
//!
//! Wire shapes (serde names) mirror the public JSON of the service:
//! camelCase fields, `"type"` tags, Unix-second timestamps.

pub mod event;
pub mod notification;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TimerError};

/// Identity of a timer.
pub type TimerId = Uuid;
/// Numeric user identity (matches the auth provider's ids).
pub type UserId = i64;

pub const NAME_MAX_LEN: usize = 60;
pub const DESCRIPTION_MAX_LEN: usize = 1000;
pub const MIN_TIMER_DURATION: i64 = 1;

/// Timer kind. `Date` timers expire terminally; `Countdown` timers can be
/// paused, resumed and reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerKind {
    Date,
    Countdown,
}

/// Display color of a timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerColor {
    #[default]
    Default,
    Red,
    Green,
    Blue,
    Purple,
    Yellow,
}

/// A timer record as stored and as returned to clients.
///
/// `is_paused` is only meaningful for [`TimerKind::Countdown`]; date timers
/// are never paused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: TimerId,
    #[serde(rename = "utc")]
    pub utc_offset: i16,
    pub creator: UserId,
    /// Unix seconds.
    pub end_time: i64,
    /// Unix seconds; zero while running.
    pub pause_time: i64,
    #[serde(rename = "type")]
    pub kind: TimerKind,
    pub name: String,
    pub description: String,
    pub color: TimerColor,
    pub with_music: bool,
    /// Seconds, fixed at creation; only shifted by explicit adjustments.
    pub duration: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_paused: bool,
}

/// A countdown timer with its authoritative pause state, loaded for
/// stop/start precondition checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownTimer {
    #[serde(flatten)]
    pub timer: Timer,
}

/// Pause state of one countdown timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerPause {
    pub id: TimerId,
    pub is_paused: bool,
    pub pause_time: i64,
}

/// Payload for creating a timer. The duration is derived once from the
/// start/end pair and never recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimer {
    pub id: TimerId,
    #[serde(rename = "utc")]
    pub utc_offset: i16,
    /// Unix seconds.
    pub start_time: i64,
    /// Unix seconds.
    pub end_time: i64,
    #[serde(rename = "type")]
    pub kind: TimerKind,
    pub name: String,
    pub description: String,
    pub color: TimerColor,
    pub with_music: bool,
}

impl CreateTimer {
    /// Duration in seconds, fixed at creation.
    pub const fn duration(&self) -> i64 {
        self.end_time - self.start_time
    }

    /// Validate display fields and times against `now` (Unix seconds).
    pub fn validate(&self, now: i64) -> Result<()> {
        validate_name(&self.name)?;
        validate_description(&self.description)?;
        if self.end_time <= now {
            return Err(TimerError::WrongTime(format!(
                "end time {} is not in the future",
                self.end_time
            )));
        }
        if self.duration() < MIN_TIMER_DURATION {
            return Err(TimerError::WrongTime(format!(
                "duration {}s is below the minimum of {MIN_TIMER_DURATION}s",
                self.duration()
            )));
        }
        Ok(())
    }
}

/// Mutable settings applied by an update operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    pub name: String,
    pub description: String,
    pub color: TimerColor,
    pub with_music: bool,
    /// Unix seconds.
    pub end_time: i64,
}

impl TimerSettings {
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_description(&self.description)
    }
}

/// One row of the authoritative subscriber relation, used by the
/// reconciliation pass to rebuild the cache and the tick registrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSubscribers {
    pub id: TimerId,
    pub end_time: i64,
    pub subscribers: Vec<UserId>,
}

fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len > NAME_MAX_LEN {
        return Err(TimerError::InvalidField {
            field: "name",
            reason: format!("length {len} exceeds {NAME_MAX_LEN}"),
        });
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<()> {
    let len = description.chars().count();
    if len > DESCRIPTION_MAX_LEN {
        return Err(TimerError::InvalidField {
            field: "description",
            reason: format!("length {len} exceeds {DESCRIPTION_MAX_LEN}"),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn create_timer(start: i64, end: i64) -> CreateTimer {
        CreateTimer {
            id: Uuid::new_v4(),
            utc_offset: 3,
            start_time: start,
            end_time: end,
            kind: TimerKind::Countdown,
            name: "pasta".into(),
            description: String::new(),
            color: TimerColor::Default,
            with_music: false,
        }
    }

    #[test]
    fn create_timer_validates_end_time() {
        let now = 1_000_000;
        assert!(create_timer(now, now + 600).validate(now).is_ok());

        let err = create_timer(now - 600, now).validate(now).unwrap_err();
        assert_eq!(err.code(), "wrong_time");
    }

    #[test]
    fn create_timer_rejects_long_name() {
        let now = 1_000_000;
        let mut t = create_timer(now, now + 60);
        t.name = "x".repeat(NAME_MAX_LEN + 1);
        let err = t.validate(now).unwrap_err();
        assert_eq!(err.code(), "invalid_field");
    }

    #[test]
    fn timer_wire_shape() {
        let timer = Timer {
            id: Uuid::nil(),
            utc_offset: 0,
            creator: 42,
            end_time: 100,
            pause_time: 0,
            kind: TimerKind::Date,
            name: "new year".into(),
            description: String::new(),
            color: TimerColor::Red,
            with_music: true,
            duration: 60,
            is_paused: false,
        };
        let json = serde_json::to_value(&timer).unwrap();
        assert_eq!(json["type"], "DATE");
        assert_eq!(json["color"], "RED");
        assert_eq!(json["endTime"], 100);
        assert_eq!(json["withMusic"], true);
        // is_paused is omitted while false, matching the public JSON
        assert!(json.get("isPaused").is_none());

        let back: Timer = serde_json::from_value(json).unwrap();
        assert_eq!(back, timer);
    }
}
