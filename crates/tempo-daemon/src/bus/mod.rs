//! In-process event bus for timer lifecycle events.
//!
//! Each connected client gets an [`EventStream`] with a bounded queue and a
//! dynamic set of timer ids it is interested in. Publishing looks up the
//! interest set for the event's timer and enqueues onto every matching
//! stream.
//!
//! Backpressure: senders are collected under the registry lock but the
//! enqueue happens outside it with `try_send`, so one slow consumer can
//! never stall unrelated publishers. A full queue drops the event for that
//! stream with a warn log; order within a stream stays FIFO.

mod stream;

pub use stream::EventStream;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use tempo_core::model::TimerId;
use tempo_core::model::event::TimerEvent;

/// Configuration for the event bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Per-stream event queue capacity.
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { queue_capacity: 64 }
    }
}

/// Bus statistics, mostly for tests and introspection.
#[derive(Debug)]
pub struct BusStats {
    /// Number of live event streams.
    pub stream_count: usize,
    /// Number of timers with at least one interested stream.
    pub watched_timers: usize,
}

pub(crate) struct BusInner {
    /// Live streams keyed by stream id.
    pub(crate) streams: HashMap<Uuid, mpsc::Sender<TimerEvent>>,
    /// Reverse index: timer id → interested stream ids.
    pub(crate) interest: HashMap<TimerId, HashSet<Uuid>>,
    /// Forward index: stream id → joined timer ids, for bulk cleanup on close.
    pub(crate) membership: HashMap<Uuid, HashSet<TimerId>>,
}

/// Publish/subscribe hub broadcasting timer events to interested streams.
pub struct TimerEventBus {
    inner: Arc<RwLock<BusInner>>,
    config: BusConfig,
}

impl TimerEventBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BusInner {
                streams: HashMap::new(),
                interest: HashMap::new(),
                membership: HashMap::new(),
            })),
            config,
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(BusConfig::default())
    }

    /// Allocate and register a new event stream.
    pub async fn new_stream(&self) -> EventStream {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);

        let mut inner = self.inner.write().await;
        inner.streams.insert(id, tx);
        drop(inner);

        debug!(stream_id = %id, "Event stream registered");
        EventStream::new(id, Arc::clone(&self.inner), rx)
    }

    /// Broadcast an event to every stream subscribed to its timer.
    pub async fn publish(&self, event: TimerEvent) {
        let timer_id = event.timer_id();

        // Snapshot matching senders under the read lock, enqueue outside it.
        let senders: Vec<(Uuid, mpsc::Sender<TimerEvent>)> = {
            let inner = self.inner.read().await;
            inner.interest.get(&timer_id).map_or_else(Vec::new, |ids| {
                ids.iter()
                    .filter_map(|id| inner.streams.get(id).map(|tx| (*id, tx.clone())))
                    .collect()
            })
        };

        for (stream_id, tx) in senders {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(stream_id = %stream_id, timer_id = %timer_id, "Event queue full, dropping event");
                }
                // Stream closed between snapshot and enqueue.
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Get bus statistics.
    pub async fn stats(&self) -> BusStats {
        let inner = self.inner.read().await;
        BusStats {
            stream_count: inner.streams.len(),
            watched_timers: inner.interest.len(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn start_event(timer_id: TimerId, end_time: i64) -> TimerEvent {
        TimerEvent::Start { timer_id, end_time }
    }

    #[tokio::test]
    async fn subscribed_stream_receives_published_events() {
        let bus = TimerEventBus::with_defaults();
        let timer = Uuid::new_v4();

        let mut stream = bus.new_stream().await;
        stream.subscribe(&[timer]).await;

        bus.publish(start_event(timer, 100)).await;

        let event = stream.recv().await.unwrap();
        assert_eq!(event, start_event(timer, 100));
    }

    #[tokio::test]
    async fn events_for_other_timers_are_not_delivered() {
        let bus = TimerEventBus::with_defaults();
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut stream = bus.new_stream().await;
        stream.subscribe(&[watched]).await;

        bus.publish(start_event(other, 1)).await;
        bus.publish(start_event(watched, 2)).await;

        // Only the watched timer's event arrives.
        assert_eq!(stream.recv().await.unwrap(), start_event(watched, 2));
    }

    #[tokio::test]
    async fn delivery_within_one_stream_is_fifo() {
        let bus = TimerEventBus::with_defaults();
        let timer = Uuid::new_v4();

        let mut stream = bus.new_stream().await;
        stream.subscribe(&[timer]).await;

        for end_time in 0..10 {
            bus.publish(start_event(timer, end_time)).await;
        }
        for end_time in 0..10 {
            assert_eq!(stream.recv().await.unwrap(), start_event(timer, end_time));
        }
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = TimerEventBus::with_defaults();
        let timer = Uuid::new_v4();

        let mut stream = bus.new_stream().await;
        stream.subscribe(&[timer]).await;
        stream.unsubscribe(&[timer]).await;

        bus.publish(start_event(timer, 1)).await;

        let stats = bus.stats().await;
        assert_eq!(stats.watched_timers, 0);

        // Nothing buffered: closing ends the stream without a delivery.
        stream.close().await;
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn unsubscribe_never_subscribed_is_noop() {
        let bus = TimerEventBus::with_defaults();
        let mut stream = bus.new_stream().await;
        stream.unsubscribe(&[Uuid::new_v4()]).await;
        stream.close().await;
    }

    #[tokio::test]
    async fn fan_out_reaches_every_subscribed_stream() {
        let bus = TimerEventBus::with_defaults();
        let timer = Uuid::new_v4();

        let mut first = bus.new_stream().await;
        let mut second = bus.new_stream().await;
        let mut bystander = bus.new_stream().await;
        first.subscribe(&[timer]).await;
        second.subscribe(&[timer]).await;
        bystander.subscribe(&[Uuid::new_v4()]).await;

        bus.publish(start_event(timer, 42)).await;

        assert_eq!(first.recv().await.unwrap(), start_event(timer, 42));
        assert_eq!(second.recv().await.unwrap(), start_event(timer, 42));

        bystander.close().await;
        assert!(bystander.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_removes_stream_from_all_indices() {
        let bus = TimerEventBus::with_defaults();
        let timer = Uuid::new_v4();

        let mut stream = bus.new_stream().await;
        stream.subscribe(&[timer, Uuid::new_v4()]).await;

        stream.close().await;

        let stats = bus.stats().await;
        assert_eq!(stats.stream_count, 0);
        assert_eq!(stats.watched_timers, 0);

        // Publishing after close must not reach the closed stream.
        bus.publish(start_event(timer, 9)).await;
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn double_close_is_safe_and_isolated() {
        let bus = TimerEventBus::with_defaults();
        let timer = Uuid::new_v4();

        let mut closing = bus.new_stream().await;
        let mut surviving = bus.new_stream().await;
        closing.subscribe(&[timer]).await;
        surviving.subscribe(&[timer]).await;

        closing.close().await;
        closing.close().await;

        bus.publish(start_event(timer, 5)).await;
        assert_eq!(surviving.recv().await.unwrap(), start_event(timer, 5));
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let bus = TimerEventBus::new(BusConfig { queue_capacity: 2 });
        let timer = Uuid::new_v4();

        let mut stream = bus.new_stream().await;
        stream.subscribe(&[timer]).await;

        for end_time in 0..5 {
            bus.publish(start_event(timer, end_time)).await;
        }

        // The first two fit, the rest were dropped with a warn.
        assert_eq!(stream.recv().await.unwrap(), start_event(timer, 0));
        assert_eq!(stream.recv().await.unwrap(), start_event(timer, 1));
        stream.close().await;
        assert!(stream.recv().await.is_none());
    }
}
