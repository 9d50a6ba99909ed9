//! Row models for timer storage.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tempo_core::error::TimerError;
use tempo_core::model::{Timer, TimerColor, TimerKind};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimerRow {
    pub id: String,
    pub utc_offset: i64,
    pub creator: i64,
    pub end_time: i64,
    pub pause_time: i64,
    pub kind: String,
    pub name: String,
    pub description: String,
    pub color: String,
    pub with_music: i64,
    pub duration: i64,
    pub is_paused: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub payload: String,
    pub created_at: i64,
}

pub(super) const fn kind_str(kind: TimerKind) -> &'static str {
    match kind {
        TimerKind::Date => "DATE",
        TimerKind::Countdown => "COUNTDOWN",
    }
}

pub(super) const fn color_str(color: TimerColor) -> &'static str {
    match color {
        TimerColor::Default => "DEFAULT",
        TimerColor::Red => "RED",
        TimerColor::Green => "GREEN",
        TimerColor::Blue => "BLUE",
        TimerColor::Purple => "PURPLE",
        TimerColor::Yellow => "YELLOW",
    }
}

fn parse_kind(s: &str) -> Result<TimerKind, TimerError> {
    match s {
        "DATE" => Ok(TimerKind::Date),
        "COUNTDOWN" => Ok(TimerKind::Countdown),
        other => Err(TimerError::Storage(format!("unknown timer kind: {other}"))),
    }
}

fn parse_color(s: &str) -> Result<TimerColor, TimerError> {
    match s {
        "DEFAULT" => Ok(TimerColor::Default),
        "RED" => Ok(TimerColor::Red),
        "GREEN" => Ok(TimerColor::Green),
        "BLUE" => Ok(TimerColor::Blue),
        "PURPLE" => Ok(TimerColor::Purple),
        "YELLOW" => Ok(TimerColor::Yellow),
        other => Err(TimerError::Storage(format!("unknown timer color: {other}"))),
    }
}

impl TryFrom<TimerRow> for Timer {
    type Error = TimerError;

    fn try_from(row: TimerRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| TimerError::Storage(format!("malformed timer id {}: {e}", row.id)))?;
        let utc_offset = i16::try_from(row.utc_offset)
            .map_err(|_| TimerError::Storage(format!("utc offset out of range: {}", row.utc_offset)))?;

        Ok(Self {
            id,
            utc_offset,
            creator: row.creator,
            end_time: row.end_time,
            pause_time: row.pause_time,
            kind: parse_kind(&row.kind)?,
            name: row.name,
            description: row.description,
            color: parse_color(&row.color)?,
            with_music: row.with_music != 0,
            duration: row.duration,
            is_paused: row.is_paused != 0,
        })
    }
}
