//! Notification dispatcher: expiry handling and notification fan-out.
//!
//! A single control loop consumes three sources: a shutdown signal, the tick
//! service's batches of expired timer ids, and an internal intake queue of
//! externally submitted notifications (today only deletions, fed by the
//! coordinator). Each item spawns its own deadline-bounded task so one slow
//! fan-out never stalls the intake of subsequent ticks.
//!
//! Fan-out partitions a timer's subscribers into online (present in the
//! per-user stream registry) and offline. Online users get the notification
//! on every live stream; offline users get a durable inbox row; and when
//! anyone was offline the notification, annotated with the offline user ids,
//! is additionally broadcast to all relay streams for out-of-band delivery.

mod stream;

pub use stream::{NotificationStream, RelayStream};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tempo_core::error::{Result, ResultExt, TimerError};
use tempo_core::model::notification::{Notification, NotificationSubscribers};
use tempo_core::model::{TimerId, TimerKind, UserId};

use crate::store::{NotificationStore, SubscriberCache, TimerStore};
use crate::tick::TickService;

/// Configuration for the notification dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Deadline for processing one expired timer or one notification.
    pub item_deadline: Duration,
    /// Intake queue capacity for externally submitted notifications.
    pub intake_capacity: usize,
    /// Per-user notification stream queue capacity.
    pub user_queue_capacity: usize,
    /// Relay stream queue capacity.
    pub relay_queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            item_deadline: Duration::from_secs(10),
            intake_capacity: 1024,
            user_queue_capacity: 64,
            relay_queue_capacity: 100,
        }
    }
}

/// Handle for submitting notifications into the dispatcher's intake queue.
///
/// Delivery is best-effort: if the dispatcher is gone the notification is
/// dropped with a warn log rather than surfacing an error into the
/// submitting operation, which already committed.
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<Notification>,
}

impl NotificationSender {
    pub async fn send(&self, notification: Notification) {
        if self.tx.send(notification).await.is_err() {
            warn!("Dispatcher intake closed, dropping notification");
        }
    }
}

/// Online-user registry: user id to that user's live stream senders.
type Registry = HashMap<UserId, HashMap<Uuid, mpsc::Sender<Notification>>>;
/// Relay-stream registry.
type Relays = HashMap<Uuid, mpsc::Sender<NotificationSubscribers>>;

/// Shared state and collaborators used by the spawned per-item tasks.
#[derive(Clone)]
struct Handler {
    timers: Arc<dyn TimerStore>,
    cache: Arc<dyn SubscriberCache>,
    inbox: Arc<dyn NotificationStore>,
    registry: Arc<RwLock<Registry>>,
    relays: Arc<RwLock<Relays>>,
    dropped: Arc<AtomicU64>,
}

/// Consumes tick batches and submitted notifications, fans out to users.
pub struct NotificationDispatcher {
    handler: Handler,
    ticks: Arc<dyn TickService>,
    config: DispatchConfig,
    intake_tx: mpsc::Sender<Notification>,
    intake_rx: Mutex<Option<mpsc::Receiver<Notification>>>,
}

impl NotificationDispatcher {
    pub fn new(
        timers: Arc<dyn TimerStore>,
        cache: Arc<dyn SubscriberCache>,
        inbox: Arc<dyn NotificationStore>,
        ticks: Arc<dyn TickService>,
        config: DispatchConfig,
    ) -> Self {
        let (intake_tx, intake_rx) = mpsc::channel(config.intake_capacity);
        Self {
            handler: Handler {
                timers,
                cache,
                inbox,
                registry: Arc::new(RwLock::new(HashMap::new())),
                relays: Arc::new(RwLock::new(HashMap::new())),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            ticks,
            config,
            intake_tx,
            intake_rx: Mutex::new(Some(intake_rx)),
        }
    }

    /// Intake handle for submitting notifications (used by the coordinator).
    pub fn sender(&self) -> NotificationSender {
        NotificationSender {
            tx: self.intake_tx.clone(),
        }
    }

    /// Notifications dropped because their subscriber set could not be
    /// resolved from the cache.
    pub fn dropped_notifications(&self) -> u64 {
        self.handler.dropped.load(Ordering::Relaxed)
    }

    /// Open a notification stream for one user and register it as online.
    pub async fn user_stream(&self, user_id: UserId) -> NotificationStream {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.config.user_queue_capacity);

        let mut registry = self.handler.registry.write().await;
        registry.entry(user_id).or_default().insert(id, tx);
        drop(registry);

        debug!(user_id, stream_id = %id, "Notification stream registered");
        NotificationStream::new(id, user_id, Arc::clone(&self.handler.registry), rx)
    }

    /// Open a relay stream receiving offline-annotated notifications.
    pub async fn relay_stream(&self) -> RelayStream {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.config.relay_queue_capacity);

        let mut relays = self.handler.relays.write().await;
        relays.insert(id, tx);
        drop(relays);

        debug!(stream_id = %id, "Relay stream registered");
        RelayStream::new(id, Arc::clone(&self.handler.relays), rx)
    }

    /// Run the control loop until shutdown is signalled or the tick stream
    /// ends. Each expired id and each submitted notification is handled in
    /// its own task under [`DispatchConfig::item_deadline`].
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut intake = self
            .intake_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| TimerError::Internal("dispatcher is already running".into()))?;

        let mut ticks = self
            .ticks
            .timer_tick()
            .await
            .step("dispatch", "open tick stream")?;

        info!("Notification dispatcher started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped shutdown sender counts as a shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Notification dispatcher shutting down");
                        return Ok(());
                    }
                }
                batch = ticks.recv() => match batch {
                    Some(timer_ids) => {
                        for timer_id in timer_ids {
                            let handler = self.handler.clone();
                            let deadline = self.config.item_deadline;
                            tokio::spawn(async move {
                                if timeout(deadline, handler.timer_expired(timer_id)).await.is_err() {
                                    warn!(timer_id = %timer_id, "Expiry handling timed out");
                                }
                            });
                        }
                    }
                    // Tick stream ended: the scheduler connection is gone
                    // and no further expiries can arrive.
                    None => {
                        warn!("Tick stream ended, stopping dispatcher");
                        return Ok(());
                    }
                },
                item = intake.recv() => {
                    // The dispatcher holds a sender itself, so the intake
                    // never closes while it runs.
                    if let Some(notification) = item {
                        let handler = self.handler.clone();
                        let deadline = self.config.item_deadline;
                        tokio::spawn(async move {
                            let timer_id = notification.timer_id();
                            if timeout(deadline, handler.timer_deleted(notification)).await.is_err() {
                                warn!(timer_id = %timer_id, "Deletion handling timed out");
                            }
                        });
                    }
                }
            }
        }
    }
}

impl Handler {
    /// One timer expired: notify all subscribers (creator included), then
    /// clean up depending on kind.
    async fn timer_expired(&self, timer_id: TimerId) {
        let timer = match self.timers.timer(timer_id).await {
            Ok(timer) => timer,
            Err(e) => {
                warn!(timer_id = %timer_id, error = %e, "Expired timer not loadable, skipping");
                return;
            }
        };

        let kind = timer.kind;
        let duration = timer.duration;
        let end_time = timer.end_time;
        self.fan_out(Notification::expired(timer), None).await;

        match kind {
            // Terminal: drop the row and the cache entry.
            TimerKind::Date => {
                let (row, cache) = tokio::join!(
                    self.timers.delete_timer(timer_id),
                    self.cache.delete_timer(timer_id),
                );
                if let Err(e) = row {
                    warn!(timer_id = %timer_id, error = %e, "Failed to delete expired timer row");
                }
                if let Err(e) = cache {
                    warn!(timer_id = %timer_id, error = %e, "Failed to delete expired timer cache entry");
                }
            }
            // Rebase the pause moment to one duration before the end time,
            // so a later start resumes with exactly one full duration ahead.
            TimerKind::Countdown => {
                let pause_time = end_time - duration;
                if let Err(e) = self
                    .timers
                    .update_pause_time(timer_id, pause_time, true)
                    .await
                {
                    warn!(timer_id = %timer_id, error = %e, "Failed to pause expired countdown timer");
                }
            }
        }
    }

    /// A timer was deleted: notify its subscribers except the creator, then
    /// drop the subscriber-cache entry.
    async fn timer_deleted(&self, notification: Notification) {
        let timer_id = notification.timer_id();
        let creator = notification.timer.creator;

        self.fan_out(notification, Some(creator)).await;

        if let Err(e) = self.cache.delete_timer(timer_id).await {
            warn!(timer_id = %timer_id, error = %e, "Failed to delete cache entry of deleted timer");
        }
    }

    /// Deliver one notification to the timer's subscribers, skipping
    /// `excluded` if given. Online users get it on every live stream,
    /// offline users get a durable inbox row, and if anyone was offline the
    /// relay streams get an offline-annotated copy.
    async fn fan_out(&self, notification: Notification, excluded: Option<UserId>) {
        let timer_id = notification.timer_id();
        let subscribers = match self.cache.timer_subscribers(timer_id).await {
            Ok(subscribers) => subscribers,
            // Best-effort path: without a subscriber set there is nobody to
            // deliver to. Count the drop so the loss stays observable.
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(timer_id = %timer_id, error = %e, "Subscriber lookup failed, dropping notification");
                return;
            }
        };

        let mut offline = Vec::new();
        let online: Vec<(UserId, Vec<mpsc::Sender<Notification>>)> = {
            let registry = self.registry.read().await;
            let mut online = Vec::new();
            for user_id in subscribers {
                if excluded == Some(user_id) {
                    continue;
                }
                match registry.get(&user_id) {
                    Some(streams) => online.push((user_id, streams.values().cloned().collect())),
                    None => offline.push(user_id),
                }
            }
            online
        };

        for (user_id, streams) in online {
            for tx in streams {
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(notification.clone()) {
                    warn!(user_id, timer_id = %timer_id, "Notification queue full, dropping notification");
                }
            }
        }

        for user_id in &offline {
            if let Err(e) = self.inbox.insert_notification(*user_id, &notification).await {
                warn!(user_id, timer_id = %timer_id, error = %e, "Failed to persist offline notification");
            }
        }

        if !offline.is_empty() {
            let annotated = NotificationSubscribers {
                notification,
                subscribers: offline,
            };
            let relays: Vec<mpsc::Sender<NotificationSubscribers>> = {
                let relays = self.relays.read().await;
                relays.values().cloned().collect()
            };
            for tx in relays {
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(annotated.clone()) {
                    warn!(timer_id = %timer_id, "Relay queue full, dropping notification");
                }
            }
        }
    }
}

/// Read side of the durable notification inbox.
pub struct NotificationInbox {
    store: Arc<dyn NotificationStore>,
}

impl NotificationInbox {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Stored notifications for the user, oldest first.
    pub async fn notifications(&self, user_id: UserId) -> Result<Vec<Notification>> {
        self.store
            .user_notifications(user_id)
            .await
            .step("notifications", "load user notifications")
    }

    /// Clear the user's inbox.
    pub async fn clear(&self, user_id: UserId) -> Result<()> {
        self.store
            .delete_user_notifications(user_id)
            .await
            .step("clear_notifications", "delete user notifications")
    }
}
