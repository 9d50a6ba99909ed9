//! Collaborator contracts consumed by the coordinator and the dispatcher.
//!
//! The coordinator never owns its stores; it operates over these traits so
//! the storage adapters stay swappable and the tests can inject fakes.
//! Implementations must signal the distinguishable conditions the domain
//! branches on: `TimerNotFound`/`CountdownTimerNotFound` for missing rows,
//! `TimerExists`/`AlreadySubscriber` for uniqueness conflicts, and
//! `SubscribersNotFound` for a missing cache entry.

use async_trait::async_trait;

use tempo_core::error::Result;
use tempo_core::model::notification::Notification;
use tempo_core::model::{
    CountdownTimer, CreateTimer, Timer, TimerId, TimerSettings, TimerSubscribers, UserId,
};

/// Durable timer records and the authoritative subscriber relation.
#[async_trait]
pub trait TimerStore: Send + Sync {
    /// Insert a date timer and subscribe its creator in the durable relation.
    async fn insert_date_timer(&self, creator: UserId, timer: &CreateTimer) -> Result<()>;

    /// Insert a countdown timer and subscribe its creator in the durable relation.
    async fn insert_countdown_timer(&self, creator: UserId, timer: &CreateTimer) -> Result<()>;

    async fn update_timer(&self, timer_id: TimerId, settings: &TimerSettings) -> Result<()>;

    async fn delete_timer(&self, timer_id: TimerId) -> Result<()>;

    async fn timer(&self, timer_id: TimerId) -> Result<Timer>;

    /// Load a countdown timer with its authoritative pause state.
    async fn countdown_timer(&self, timer_id: TimerId) -> Result<CountdownTimer>;

    async fn update_end_time(&self, timer_id: TimerId, end_time: i64) -> Result<()>;

    async fn update_pause_time(
        &self,
        timer_id: TimerId,
        pause_time: i64,
        is_paused: bool,
    ) -> Result<()>;

    async fn subscribe(&self, timer_id: TimerId, user_id: UserId) -> Result<()>;

    async fn unsubscribe(&self, timer_id: TimerId, user_id: UserId) -> Result<()>;

    /// Timers created by the user, newest first.
    async fn user_created_timers(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Timer>>;

    /// Timers the user subscribed to but did not create.
    async fn user_subscriptions(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Timer>>;

    /// All timers the user receives events for (created plus subscribed).
    async fn user_timers(&self, user_id: UserId, offset: i64, limit: i64) -> Result<Vec<Timer>>;

    /// Page over the authoritative subscriber relation for running timers.
    /// Feeds the cache/tick reconciliation pass.
    async fn timers_with_subscribers(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<TimerSubscribers>>;
}

/// Fast subscriber-set lookups keyed by timer id. A derived, rebuildable
/// projection of the durable relation; its loss is recoverable via
/// [`crate::reconcile::Reconciler`].
#[async_trait]
pub trait SubscriberCache: Send + Sync {
    async fn subscribe(&self, timer_id: TimerId, user_ids: &[UserId]) -> Result<()>;

    async fn unsubscribe(&self, timer_id: TimerId, user_id: UserId) -> Result<()>;

    async fn timer_subscribers(&self, timer_id: TimerId) -> Result<Vec<UserId>>;

    async fn delete_timer(&self, timer_id: TimerId) -> Result<()>;
}

/// Durable per-user notification inbox: the offline delivery fallback.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(
        &self,
        user_id: UserId,
        notification: &Notification,
    ) -> Result<()>;

    /// Stored notifications for the user, oldest first.
    async fn user_notifications(&self, user_id: UserId) -> Result<Vec<Notification>>;

    /// Clear the user's inbox (read-and-clear semantics).
    async fn delete_user_notifications(&self, user_id: UserId) -> Result<()>;
}
