//! Per-connection event stream.

use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use tempo_core::model::TimerId;
use tempo_core::model::event::TimerEvent;

use super::BusInner;

/// One live connection's subscription state on the event bus.
///
/// Lives exactly as long as the owning connection; [`EventStream::close`]
/// must be called when the connection ends so the registry and interest
/// indices drop the stream. Closing is idempotent.
pub struct EventStream {
    id: Uuid,
    inner: Arc<RwLock<BusInner>>,
    rx: mpsc::Receiver<TimerEvent>,
}

impl EventStream {
    pub(super) fn new(id: Uuid, inner: Arc<RwLock<BusInner>>, rx: mpsc::Receiver<TimerEvent>) -> Self {
        Self { id, inner, rx }
    }

    /// The stream's unique id.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Add the stream to each timer's interest set. Idempotent.
    pub async fn subscribe(&self, timer_ids: &[TimerId]) {
        let mut inner = self.inner.write().await;
        for timer_id in timer_ids {
            inner.interest.entry(*timer_id).or_default().insert(self.id);
            inner.membership.entry(self.id).or_default().insert(*timer_id);
        }
    }

    /// Remove the stream from each timer's interest set. Unsubscribing from
    /// a timer never subscribed to is a no-op.
    pub async fn unsubscribe(&self, timer_ids: &[TimerId]) {
        let mut inner = self.inner.write().await;
        for timer_id in timer_ids {
            if let Some(streams) = inner.interest.get_mut(timer_id) {
                streams.remove(&self.id);
                if streams.is_empty() {
                    inner.interest.remove(timer_id);
                }
            }
            if let Some(timers) = inner.membership.get_mut(&self.id) {
                timers.remove(timer_id);
            }
        }
    }

    /// Receive the next event. Returns `None` once the stream is closed and
    /// its queue is drained.
    pub async fn recv(&mut self) -> Option<TimerEvent> {
        self.rx.recv().await
    }

    /// Remove the stream from the registry and from every timer's interest
    /// set it ever joined, then close its queue. Safe to call twice.
    pub async fn close(&mut self) {
        {
            let mut inner = self.inner.write().await;
            inner.streams.remove(&self.id);
            if let Some(timers) = inner.membership.remove(&self.id) {
                for timer_id in timers {
                    if let Some(streams) = inner.interest.get_mut(&timer_id) {
                        streams.remove(&self.id);
                        if streams.is_empty() {
                            inner.interest.remove(&timer_id);
                        }
                    }
                }
            }
        }
        self.rx.close();
        debug!(stream_id = %self.id, "Event stream closed");
    }
}
