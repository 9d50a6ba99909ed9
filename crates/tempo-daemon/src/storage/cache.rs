//! In-memory subscriber cache.
//!
//! A derived projection of the durable subscriber relation, kept hot for
//! the fan-out path. Lost on restart and rebuilt by the reconciliation
//! pass, so nothing here needs to survive the process.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use tempo_core::error::{Result, TimerError};
use tempo_core::model::{TimerId, UserId};

use crate::store::SubscriberCache;

#[derive(Default)]
pub struct MemorySubscriberCache {
    inner: RwLock<HashMap<TimerId, HashSet<UserId>>>,
}

impl MemorySubscriberCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TimerId, HashSet<UserId>>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TimerId, HashSet<UserId>>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SubscriberCache for MemorySubscriberCache {
    async fn subscribe(&self, timer_id: TimerId, user_ids: &[UserId]) -> Result<()> {
        let mut inner = self.write();
        inner.entry(timer_id).or_default().extend(user_ids);
        Ok(())
    }

    async fn unsubscribe(&self, timer_id: TimerId, user_id: UserId) -> Result<()> {
        let mut inner = self.write();
        match inner.get_mut(&timer_id) {
            Some(subscribers) => {
                subscribers.remove(&user_id);
                Ok(())
            }
            None => Err(TimerError::SubscribersNotFound(timer_id)),
        }
    }

    async fn timer_subscribers(&self, timer_id: TimerId) -> Result<Vec<UserId>> {
        let inner = self.read();
        inner.get(&timer_id).map_or(
            Err(TimerError::SubscribersNotFound(timer_id)),
            |subscribers| {
                let mut users: Vec<UserId> = subscribers.iter().copied().collect();
                users.sort_unstable();
                Ok(users)
            },
        )
    }

    async fn delete_timer(&self, timer_id: TimerId) -> Result<()> {
        let mut inner = self.write();
        inner.remove(&timer_id);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn subscribe_and_lookup() {
        let cache = MemorySubscriberCache::new();
        let timer = Uuid::new_v4();

        cache.subscribe(timer, &[3, 1, 2]).await.unwrap();
        cache.subscribe(timer, &[2, 4]).await.unwrap();

        assert_eq!(cache.timer_subscribers(timer).await.unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn missing_entry_is_distinguishable() {
        let cache = MemorySubscriberCache::new();
        let err = cache.timer_subscribers(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, TimerError::SubscribersNotFound(_)));
    }

    #[tokio::test]
    async fn unsubscribe_removes_one_user() {
        let cache = MemorySubscriberCache::new();
        let timer = Uuid::new_v4();

        cache.subscribe(timer, &[1, 2]).await.unwrap();
        cache.unsubscribe(timer, 1).await.unwrap();

        assert_eq!(cache.timer_subscribers(timer).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn delete_drops_the_entry() {
        let cache = MemorySubscriberCache::new();
        let timer = Uuid::new_v4();

        cache.subscribe(timer, &[1]).await.unwrap();
        cache.delete_timer(timer).await.unwrap();
        // Deleting twice stays quiet.
        cache.delete_timer(timer).await.unwrap();

        assert!(cache.timer_subscribers(timer).await.is_err());
    }
}
