//! Per-user notification streams and external relay streams.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use tempo_core::model::UserId;
use tempo_core::model::notification::{Notification, NotificationSubscribers};

type Registry = HashMap<UserId, HashMap<Uuid, mpsc::Sender<Notification>>>;
type Relays = HashMap<Uuid, mpsc::Sender<NotificationSubscribers>>;

/// One user's live notification stream.
///
/// Registered in the online registry on creation; [`NotificationStream::close`]
/// deregisters it, removing the user's registry entry entirely once their
/// last stream closes. Closing is idempotent.
pub struct NotificationStream {
    id: Uuid,
    user_id: UserId,
    registry: Arc<RwLock<Registry>>,
    rx: mpsc::Receiver<Notification>,
}

impl NotificationStream {
    pub(super) fn new(
        id: Uuid,
        user_id: UserId,
        registry: Arc<RwLock<Registry>>,
        rx: mpsc::Receiver<Notification>,
    ) -> Self {
        Self {
            id,
            user_id,
            registry,
            rx,
        }
    }

    /// The stream's unique id.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The user this stream delivers to.
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Receive the next notification. Returns `None` once the stream is
    /// closed and its queue is drained.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Deregister from the online registry and close the queue. The user
    /// counts as offline once their last stream is gone. Safe to call twice.
    pub async fn close(&mut self) {
        {
            let mut registry = self.registry.write().await;
            if let Some(streams) = registry.get_mut(&self.user_id) {
                streams.remove(&self.id);
                if streams.is_empty() {
                    registry.remove(&self.user_id);
                }
            }
        }
        self.rx.close();
        debug!(user_id = self.user_id, stream_id = %self.id, "Notification stream closed");
    }
}

/// An external-service stream receiving offline-annotated notifications for
/// relay to an out-of-band channel.
pub struct RelayStream {
    id: Uuid,
    relays: Arc<RwLock<Relays>>,
    rx: mpsc::Receiver<NotificationSubscribers>,
}

impl RelayStream {
    pub(super) fn new(
        id: Uuid,
        relays: Arc<RwLock<Relays>>,
        rx: mpsc::Receiver<NotificationSubscribers>,
    ) -> Self {
        Self { id, relays, rx }
    }

    /// The stream's unique id.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Receive the next annotated notification.
    pub async fn recv(&mut self) -> Option<NotificationSubscribers> {
        self.rx.recv().await
    }

    /// Deregister and close the queue. Safe to call twice.
    pub async fn close(&mut self) {
        {
            let mut relays = self.relays.write().await;
            relays.remove(&self.id);
        }
        self.rx.close();
        debug!(stream_id = %self.id, "Relay stream closed");
    }
}
