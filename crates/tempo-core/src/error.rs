//! Domain error taxonomy for timer operations.
//!
//! Every coordinator and dispatcher failure surfaces as a [`TimerError`].
//! Collaborator failures get wrapped into [`TimerError::Op`] with the
//! operation name and the failing step, but [`TimerError::kind`] and
//! [`TimerError::code`] always resolve through the wrapping so callers can
//! branch on the underlying domain condition.

use thiserror::Error;

use crate::model::{TimerId, UserId};

/// Result type alias using [`TimerError`].
pub type Result<T> = std::result::Result<T, TimerError>;

/// Coarse classification of a [`TimerError`], used by transport layers to
/// pick a status class without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    InvalidState,
    Validation,
    Internal,
}

/// Errors produced by timer operations.
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer {0} not found")]
    TimerNotFound(TimerId),

    #[error("countdown timer {0} not found")]
    CountdownTimerNotFound(TimerId),

    #[error("subscribers of timer {0} not found")]
    SubscribersNotFound(TimerId),

    #[error("no stored notifications for user {0}")]
    NotificationNotFound(UserId),

    #[error("timer {0} already exists")]
    TimerExists(TimerId),

    #[error("user {user_id} is already subscribed to timer {timer_id}")]
    AlreadySubscriber { timer_id: TimerId, user_id: UserId },

    #[error("user {user_id} is not the creator of timer {timer_id}")]
    Forbidden { timer_id: TimerId, user_id: UserId },

    #[error("timer {0} is paused")]
    TimerIsPaused(TimerId),

    #[error("timer {0} is already running")]
    TimerIsPlaying(TimerId),

    #[error("creator cannot unsubscribe from own timer {0}")]
    CreatorUnsubscribe(TimerId),

    #[error("invalid timer time: {0}")]
    WrongTime(String),

    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    #[error("operation {0} exceeded its deadline")]
    DeadlineExceeded(&'static str),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("tick service error: {0}")]
    Tick(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// Causal-trail wrapper: which operation and which step failed.
    #[error("{op}: {step}: {source}")]
    Op {
        op: &'static str,
        step: &'static str,
        #[source]
        source: Box<TimerError>,
    },
}

impl TimerError {
    /// Peel [`TimerError::Op`] wrappers down to the triggering error.
    pub fn root(&self) -> &Self {
        let mut err = self;
        while let Self::Op { source, .. } = err {
            err = source;
        }
        err
    }

    /// Classify the underlying error, looking through causal wrapping.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::TimerNotFound(_)
            | Self::CountdownTimerNotFound(_)
            | Self::SubscribersNotFound(_)
            | Self::NotificationNotFound(_) => ErrorKind::NotFound,
            Self::TimerExists(_) | Self::AlreadySubscriber { .. } => ErrorKind::Conflict,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::TimerIsPaused(_) | Self::TimerIsPlaying(_) | Self::CreatorUnsubscribe(_) => {
                ErrorKind::InvalidState
            }
            Self::WrongTime(_) | Self::InvalidField { .. } => ErrorKind::Validation,
            Self::DeadlineExceeded(_)
            | Self::Storage(_)
            | Self::Tick(_)
            | Self::Internal(_)
            | Self::Op { .. } => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for the underlying error.
    pub fn code(&self) -> &'static str {
        match self.root() {
            Self::TimerNotFound(_) => "timer_not_found",
            Self::CountdownTimerNotFound(_) => "countdown_timer_not_found",
            Self::SubscribersNotFound(_) => "subscribers_not_found",
            Self::NotificationNotFound(_) => "notification_not_found",
            Self::TimerExists(_) => "timer_exists",
            Self::AlreadySubscriber { .. } => "already_subscriber",
            Self::Forbidden { .. } => "forbidden",
            Self::TimerIsPaused(_) => "timer_is_paused",
            Self::TimerIsPlaying(_) => "timer_is_playing",
            Self::CreatorUnsubscribe(_) => "creator_unsubscribe",
            Self::WrongTime(_) => "wrong_time",
            Self::InvalidField { .. } => "invalid_field",
            Self::DeadlineExceeded(_) => "deadline_exceeded",
            Self::Storage(_) => "storage",
            Self::Tick(_) => "tick_service",
            Self::Internal(_) | Self::Op { .. } => "internal",
        }
    }

    /// Attach an (operation, step) causal trail entry.
    pub fn in_op(self, op: &'static str, step: &'static str) -> Self {
        Self::Op {
            op,
            step,
            source: Box::new(self),
        }
    }
}

impl From<crate::db::DatabaseError> for TimerError {
    fn from(e: crate::db::DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Extension adding causal-trail wrapping to `Result<T, TimerError>`.
pub trait ResultExt<T> {
    /// Wrap the error side with the operation name and the failing step.
    fn step(self, op: &'static str, step: &'static str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn step(self, op: &'static str, step: &'static str) -> Result<T> {
        self.map_err(|e| e.in_op(op, step))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn kind_survives_wrapping() {
        let id = Uuid::new_v4();
        let err = TimerError::TimerNotFound(id)
            .in_op("delete", "load timer")
            .in_op("delete", "check access");

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), "timer_not_found");
        assert!(matches!(err.root(), TimerError::TimerNotFound(found) if *found == id));
    }

    #[test]
    fn trail_appears_in_display() {
        let err = TimerError::TimerExists(Uuid::new_v4()).in_op("create", "register end time");
        let text = err.to_string();
        assert!(text.starts_with("create: register end time:"));
    }

    #[test]
    fn result_ext_wraps_err_only() {
        let ok: Result<u8> = Ok(7);
        assert_eq!(ok.step("op", "step").unwrap(), 7);

        let err: Result<u8> = Err(TimerError::Internal("boom".into()));
        let wrapped = err.step("op", "step").unwrap_err();
        assert_eq!(wrapped.kind(), ErrorKind::Internal);
    }

    #[test]
    fn classification_table() {
        let id = Uuid::new_v4();
        assert_eq!(TimerError::TimerExists(id).kind(), ErrorKind::Conflict);
        assert_eq!(
            TimerError::Forbidden {
                timer_id: id,
                user_id: 1
            }
            .kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(TimerError::TimerIsPaused(id).kind(), ErrorKind::InvalidState);
        assert_eq!(
            TimerError::WrongTime("end time in the past".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(TimerError::DeadlineExceeded("create").kind(), ErrorKind::Internal);
    }
}
