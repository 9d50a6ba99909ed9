//! Startup reconciliation: rebuild the subscriber cache and the tick
//! registrations from the store's authoritative subscriber relation.
//!
//! The cache is an in-process projection and the tick service may have been
//! restarted, so after a cold start neither matches the durable state. This
//! pass pages over every running timer, re-registers its end time with the
//! tick service in bulk, and repopulates its cache entry. Paused countdown
//! timers are skipped: they hold no tick registration and regain their
//! cache entry on the next lifecycle operation.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use tempo_core::error::{Result, ResultExt, TimerError};
use tempo_core::model::TimerSubscribers;

use crate::store::{SubscriberCache, TimerStore};
use crate::tick::TickService;

const PAGE_SIZE: i64 = 100;

pub struct Reconciler {
    timers: Arc<dyn TimerStore>,
    cache: Arc<dyn SubscriberCache>,
    ticks: Arc<dyn TickService>,
}

impl Reconciler {
    pub fn new(
        timers: Arc<dyn TimerStore>,
        cache: Arc<dyn SubscriberCache>,
        ticks: Arc<dyn TickService>,
    ) -> Self {
        Self {
            timers,
            cache,
            ticks,
        }
    }

    /// Run one full reconciliation pass. Returns the number of timers
    /// restored.
    pub async fn invoke(&self) -> Result<usize> {
        let mut offset = 0;
        let mut restored = 0;

        loop {
            let page = self
                .timers
                .timers_with_subscribers(offset, PAGE_SIZE)
                .await
                .step("reconcile", "page subscriber relation")?;
            if page.is_empty() {
                break;
            }

            restored += page.len();
            self.restore(&page).await?;
            offset += PAGE_SIZE;
        }

        info!(restored, "Reconciliation complete");
        Ok(restored)
    }

    async fn restore(&self, page: &[TimerSubscribers]) -> Result<()> {
        let end_times: HashMap<_, _> = page
            .iter()
            .map(|timer| (timer.id, timer.end_time))
            .collect();

        let register = async {
            self.ticks
                .add_many(&end_times)
                .await
                .step("reconcile", "re-register timers with tick service")
        };
        let repopulate = async {
            for timer in page {
                self.cache
                    .subscribe(timer.id, &timer.subscribers)
                    .await
                    .step("reconcile", "repopulate cache entry")?;
            }
            Ok::<(), TimerError>(())
        };

        let (register, repopulate) = tokio::join!(register, repopulate);
        register.and(repopulate)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::{Mutex, mpsc};
    use uuid::Uuid;

    use tempo_core::db::unix_timestamp;
    use tempo_core::model::{CreateTimer, TimerColor, TimerId, TimerKind};

    use crate::storage::{Database, MemorySubscriberCache};
    use crate::store::TimerStore;

    #[derive(Default)]
    struct RecordingTicks {
        registered: Mutex<HashMap<TimerId, i64>>,
    }

    #[async_trait]
    impl TickService for RecordingTicks {
        async fn add(&self, timer_id: TimerId, end_time: i64) -> Result<()> {
            self.registered.lock().await.insert(timer_id, end_time);
            Ok(())
        }

        async fn add_many(&self, timers: &HashMap<TimerId, i64>) -> Result<()> {
            self.registered.lock().await.extend(timers);
            Ok(())
        }

        async fn start(&self, _timer_id: TimerId, _end_time: i64) -> Result<()> {
            Ok(())
        }

        async fn stop(&self, _timer_id: TimerId) -> Result<()> {
            Ok(())
        }

        async fn remove(&self, _timer_id: TimerId) -> Result<()> {
            Ok(())
        }

        async fn timer_tick(&self) -> Result<mpsc::Receiver<Vec<TimerId>>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
    }

    fn payload() -> CreateTimer {
        let now = unix_timestamp();
        CreateTimer {
            id: Uuid::new_v4(),
            utc_offset: 0,
            start_time: now,
            end_time: now + 600,
            kind: TimerKind::Countdown,
            name: "tea".into(),
            description: String::new(),
            color: TimerColor::Default,
            with_music: false,
        }
    }

    #[tokio::test]
    async fn cold_start_restores_cache_and_tick_registrations() {
        let db = Database::open_in_memory().await.unwrap();
        let running = payload();
        db.insert_countdown_timer(7, &running).await.unwrap();
        db.subscribe(running.id, 8).await.unwrap();

        let paused = payload();
        db.insert_countdown_timer(7, &paused).await.unwrap();
        db.update_pause_time(paused.id, 100, true).await.unwrap();

        // Fresh cache and tick service, as after a restart.
        let cache = Arc::new(MemorySubscriberCache::new());
        let ticks = Arc::new(RecordingTicks::default());
        let reconciler = Reconciler::new(
            Arc::new(db),
            Arc::clone(&cache) as Arc<dyn SubscriberCache>,
            Arc::clone(&ticks) as Arc<dyn TickService>,
        );

        let restored = reconciler.invoke().await.unwrap();
        assert_eq!(restored, 1);

        assert_eq!(
            cache.timer_subscribers(running.id).await.unwrap(),
            vec![7, 8]
        );
        assert_eq!(
            ticks.registered.lock().await.get(&running.id),
            Some(&running.end_time)
        );

        // The paused timer stays out of both.
        assert!(cache.timer_subscribers(paused.id).await.is_err());
        assert!(ticks.registered.lock().await.get(&paused.id).is_none());
    }

    #[tokio::test]
    async fn empty_store_reconciles_to_nothing() {
        let db = Database::open_in_memory().await.unwrap();
        let cache = Arc::new(MemorySubscriberCache::new());
        let ticks = Arc::new(RecordingTicks::default());
        let reconciler = Reconciler::new(
            Arc::new(db),
            cache as Arc<dyn SubscriberCache>,
            ticks as Arc<dyn TickService>,
        );

        assert_eq!(reconciler.invoke().await.unwrap(), 0);
    }
}
