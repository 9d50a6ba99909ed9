//! Timer coordinator: saga-guarded lifecycle operations across the timer
//! store, the subscriber cache and the tick service.
//!
//! Every mutating operation runs under a fixed deadline and wraps its
//! multi-store writes in a [`Saga`]: each collaborator write registers its
//! own compensation right after succeeding, so whichever writes already
//! landed get undone when a later step fails. Successful mutations publish
//! lifecycle events into the bus; deletions additionally feed the
//! notification dispatcher.

mod countdown;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{error::Elapsed, timeout};
use tracing::info;

use tempo_core::db::unix_timestamp;
use tempo_core::error::{Result, ResultExt, TimerError};
use tempo_core::model::event::TimerEvent;
use tempo_core::model::notification::Notification;
use tempo_core::model::{CreateTimer, Timer, TimerId, TimerKind, TimerSettings, UserId};
use tempo_core::saga::Saga;

use crate::bus::TimerEventBus;
use crate::dispatch::NotificationSender;
use crate::store::{SubscriberCache, TimerStore};
use crate::tick::TickService;

const OP_CREATE: &str = "create";
const OP_DELETE: &str = "delete";
const OP_UPDATE: &str = "update";
const OP_SUBSCRIBE: &str = "subscribe";
const OP_UNSUBSCRIBE: &str = "unsubscribe";

/// Configuration for coordinator operations.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Fixed ceiling for one mutating operation. Callers can cancel earlier
    /// but cannot extend it.
    pub operation_deadline: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            operation_deadline: Duration::from_secs(30),
        }
    }
}

/// Orchestrates timer lifecycle operations over the three collaborators.
pub struct TimerCoordinator {
    timers: Arc<dyn TimerStore>,
    cache: Arc<dyn SubscriberCache>,
    ticks: Arc<dyn TickService>,
    bus: Arc<TimerEventBus>,
    notifications: NotificationSender,
    config: CoordinatorConfig,
}

impl TimerCoordinator {
    pub fn new(
        timers: Arc<dyn TimerStore>,
        cache: Arc<dyn SubscriberCache>,
        ticks: Arc<dyn TickService>,
        bus: Arc<TimerEventBus>,
        notifications: NotificationSender,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            timers,
            cache,
            ticks,
            bus,
            notifications,
            config,
        }
    }

    /// Create a timer: insert the record, subscribe the creator, register
    /// the end time with the tick service. The three writes run
    /// concurrently; any failure undoes the ones that already succeeded.
    pub async fn create(&self, creator: UserId, timer: CreateTimer) -> Result<()> {
        timer.validate(unix_timestamp())?;

        let saga = Saga::new();
        let outcome = timeout(
            self.config.operation_deadline,
            self.create_writes(creator, &timer, &saga),
        )
        .await;
        settle(OP_CREATE, &saga, outcome).await?;

        info!(timer_id = %timer.id, creator, kind = ?timer.kind, "Timer created");
        Ok(())
    }

    async fn create_writes(
        &self,
        creator: UserId,
        timer: &CreateTimer,
        saga: &Saga,
    ) -> Result<()> {
        let timer_id = timer.id;

        let insert_row = async {
            match timer.kind {
                TimerKind::Date => self
                    .timers
                    .insert_date_timer(creator, timer)
                    .await
                    .step(OP_CREATE, "insert timer row")?,
                TimerKind::Countdown => self
                    .timers
                    .insert_countdown_timer(creator, timer)
                    .await
                    .step(OP_CREATE, "insert timer row")?,
            }
            let timers = Arc::clone(&self.timers);
            saga.register("delete timer row", async move {
                timers.delete_timer(timer_id).await
            });
            Ok::<(), TimerError>(())
        };

        let subscribe_creator = async {
            self.cache
                .subscribe(timer_id, &[creator])
                .await
                .step(OP_CREATE, "subscribe creator in cache")?;
            let cache = Arc::clone(&self.cache);
            saga.register("remove subscriber cache entry", async move {
                cache.delete_timer(timer_id).await
            });
            Ok::<(), TimerError>(())
        };

        let register_tick = async {
            self.ticks
                .add(timer_id, timer.end_time)
                .await
                .step(OP_CREATE, "register end time with tick service")?;
            let ticks = Arc::clone(&self.ticks);
            saga.register("deregister from tick service", async move {
                ticks.remove(timer_id).await
            });
            Ok::<(), TimerError>(())
        };

        // Wait for all three so every succeeded write has its compensation
        // registered before settle() decides what to do.
        let (row, cache, tick) = tokio::join!(insert_row, subscribe_creator, register_tick);
        row.and(cache).and(tick)
    }

    /// Delete a timer. Creator-only. A running timer is first deregistered
    /// from the tick service (with re-registration as the compensation); a
    /// paused countdown timer was never registered, so that step is skipped.
    pub async fn delete(&self, timer_id: TimerId, user_id: UserId) -> Result<()> {
        let saga = Saga::new();
        let outcome = timeout(
            self.config.operation_deadline,
            self.delete_writes(timer_id, user_id, &saga),
        )
        .await;
        settle(OP_DELETE, &saga, outcome).await?;

        info!(timer_id = %timer_id, user_id, "Timer deleted");
        Ok(())
    }

    async fn delete_writes(&self, timer_id: TimerId, user_id: UserId, saga: &Saga) -> Result<()> {
        let timer = self
            .check_access(OP_DELETE, timer_id, user_id)
            .await
            .step(OP_DELETE, "check access")?;

        if !timer.is_paused {
            self.ticks
                .remove(timer_id)
                .await
                .step(OP_DELETE, "deregister from tick service")?;
            let ticks = Arc::clone(&self.ticks);
            let end_time = timer.end_time;
            saga.register("re-register with tick service", async move {
                ticks.add(timer_id, end_time).await
            });
        }

        self.timers
            .delete_timer(timer_id)
            .await
            .step(OP_DELETE, "delete timer row")?;

        self.notifications.send(Notification::delete(timer)).await;
        Ok(())
    }

    /// Update a timer's settings. Creator-only. When the end time changes on
    /// a running timer, the tick registration is updated too; failure of
    /// that step rolls back the settings write.
    pub async fn update(
        &self,
        timer_id: TimerId,
        user_id: UserId,
        settings: TimerSettings,
    ) -> Result<()> {
        settings.validate()?;

        let saga = Saga::new();
        let outcome = timeout(
            self.config.operation_deadline,
            self.update_writes(timer_id, user_id, &settings, &saga),
        )
        .await;
        settle(OP_UPDATE, &saga, outcome).await?;

        self.bus
            .publish(TimerEvent::Update { timer_id, settings })
            .await;
        Ok(())
    }

    async fn update_writes(
        &self,
        timer_id: TimerId,
        user_id: UserId,
        settings: &TimerSettings,
        saga: &Saga,
    ) -> Result<()> {
        let timer = self
            .check_access(OP_UPDATE, timer_id, user_id)
            .await
            .step(OP_UPDATE, "check access")?;

        self.timers
            .update_timer(timer_id, settings)
            .await
            .step(OP_UPDATE, "write settings")?;
        let timers = Arc::clone(&self.timers);
        let previous = TimerSettings {
            name: timer.name.clone(),
            description: timer.description.clone(),
            color: timer.color,
            with_music: timer.with_music,
            end_time: timer.end_time,
        };
        saga.register("restore previous settings", async move {
            timers.update_timer(timer_id, &previous).await
        });

        // A paused countdown timer holds no tick registration to move.
        if settings.end_time != timer.end_time && !timer.is_paused {
            self.ticks
                .start(timer_id, settings.end_time)
                .await
                .step(OP_UPDATE, "move tick registration")?;
            let ticks = Arc::clone(&self.ticks);
            let end_time = timer.end_time;
            saga.register("restore tick registration", async move {
                ticks.start(timer_id, end_time).await
            });
        }
        Ok(())
    }

    /// Subscribe a user to someone else's timer. The cache write and the
    /// durable relation write run concurrently; either failure rolls back
    /// the other. Returns the timer snapshot.
    pub async fn subscribe(&self, timer_id: TimerId, user_id: UserId) -> Result<Timer> {
        let saga = Saga::new();
        let outcome = timeout(
            self.config.operation_deadline,
            self.subscribe_writes(timer_id, user_id, &saga),
        )
        .await;
        let timer = settle(OP_SUBSCRIBE, &saga, outcome).await?;

        info!(timer_id = %timer_id, user_id, "User subscribed");
        Ok(timer)
    }

    async fn subscribe_writes(
        &self,
        timer_id: TimerId,
        user_id: UserId,
        saga: &Saga,
    ) -> Result<Timer> {
        // The precondition load counts against the deadline too.
        let timer = self
            .timers
            .timer(timer_id)
            .await
            .step(OP_SUBSCRIBE, "load timer")?;
        if timer.creator == user_id {
            return Err(TimerError::AlreadySubscriber { timer_id, user_id });
        }

        let in_cache = async {
            self.cache
                .subscribe(timer_id, &[user_id])
                .await
                .step(OP_SUBSCRIBE, "subscribe in cache")?;
            let cache = Arc::clone(&self.cache);
            saga.register("unsubscribe in cache", async move {
                cache.unsubscribe(timer_id, user_id).await
            });
            Ok::<(), TimerError>(())
        };

        let in_store = async {
            self.timers
                .subscribe(timer_id, user_id)
                .await
                .step(OP_SUBSCRIBE, "subscribe in store")?;
            let timers = Arc::clone(&self.timers);
            saga.register("unsubscribe in store", async move {
                timers.unsubscribe(timer_id, user_id).await
            });
            Ok::<(), TimerError>(())
        };

        let (cache, store) = tokio::join!(in_cache, in_store);
        cache.and(store)?;
        Ok(timer)
    }

    /// Unsubscribe a user from a timer. The creator cannot unsubscribe from
    /// their own timer.
    pub async fn unsubscribe(&self, timer_id: TimerId, user_id: UserId) -> Result<()> {
        let saga = Saga::new();
        let outcome = timeout(
            self.config.operation_deadline,
            self.unsubscribe_writes(timer_id, user_id, &saga),
        )
        .await;
        settle(OP_UNSUBSCRIBE, &saga, outcome).await?;

        info!(timer_id = %timer_id, user_id, "User unsubscribed");
        Ok(())
    }

    async fn unsubscribe_writes(
        &self,
        timer_id: TimerId,
        user_id: UserId,
        saga: &Saga,
    ) -> Result<()> {
        let timer = self
            .timers
            .timer(timer_id)
            .await
            .step(OP_UNSUBSCRIBE, "load timer")?;
        if timer.creator == user_id {
            return Err(TimerError::CreatorUnsubscribe(timer_id));
        }

        let in_cache = async {
            self.cache
                .unsubscribe(timer_id, user_id)
                .await
                .step(OP_UNSUBSCRIBE, "unsubscribe in cache")?;
            let cache = Arc::clone(&self.cache);
            saga.register("re-subscribe in cache", async move {
                cache.subscribe(timer_id, &[user_id]).await
            });
            Ok::<(), TimerError>(())
        };

        let in_store = async {
            self.timers
                .unsubscribe(timer_id, user_id)
                .await
                .step(OP_UNSUBSCRIBE, "unsubscribe in store")?;
            let timers = Arc::clone(&self.timers);
            saga.register("re-subscribe in store", async move {
                timers.subscribe(timer_id, user_id).await
            });
            Ok::<(), TimerError>(())
        };

        let (cache, store) = tokio::join!(in_cache, in_store);
        cache.and(store)
    }

    /// Load one timer.
    pub async fn timer(&self, timer_id: TimerId) -> Result<Timer> {
        self.timers.timer(timer_id).await.step("timer", "load timer")
    }

    /// Timers created by the user, newest first.
    pub async fn user_created_timers(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Timer>> {
        self.timers
            .user_created_timers(user_id, offset, limit)
            .await
            .step("user_created_timers", "load timers")
    }

    /// Timers the user subscribed to but did not create.
    pub async fn user_subscriptions(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Timer>> {
        self.timers
            .user_subscriptions(user_id, offset, limit)
            .await
            .step("user_subscriptions", "load timers")
    }

    /// All timers the user receives events for.
    pub async fn user_timers(&self, user_id: UserId, offset: i64, limit: i64) -> Result<Vec<Timer>> {
        self.timers
            .user_timers(user_id, offset, limit)
            .await
            .step("user_timers", "load timers")
    }

    /// Subscriber ids of one timer, from the fast cache path.
    pub async fn timer_subscribers(&self, timer_id: TimerId) -> Result<Vec<UserId>> {
        self.cache
            .timer_subscribers(timer_id)
            .await
            .step("timer_subscribers", "load subscribers from cache")
    }

    /// Load the timer and require the caller to be its creator.
    async fn check_access(
        &self,
        op: &'static str,
        timer_id: TimerId,
        user_id: UserId,
    ) -> Result<Timer> {
        let timer = self.timers.timer(timer_id).await.step(op, "load timer")?;
        if timer.creator != user_id {
            return Err(TimerError::Forbidden { timer_id, user_id });
        }
        Ok(timer)
    }
}

/// Commit on success; roll back on failure or deadline expiry.
async fn settle<T>(
    op: &'static str,
    saga: &Saga,
    outcome: std::result::Result<Result<T>, Elapsed>,
) -> Result<T> {
    match outcome {
        Ok(Ok(value)) => {
            saga.commit();
            Ok(value)
        }
        Ok(Err(e)) => {
            saga.rollback().await;
            Err(e)
        }
        Err(_) => {
            saga.rollback().await;
            Err(TimerError::DeadlineExceeded(op))
        }
    }
}
