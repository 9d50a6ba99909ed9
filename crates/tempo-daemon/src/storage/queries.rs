//! Timer and subscriber-relation queries.

use async_trait::async_trait;

use tempo_core::db::unix_timestamp;
use tempo_core::error::{Result, TimerError};
use tempo_core::model::{
    CountdownTimer, CreateTimer, Timer, TimerId, TimerSettings, TimerSubscribers, UserId,
};
use uuid::Uuid;

use super::db::Database;
use super::models::{TimerRow, color_str, kind_str};
use crate::store::TimerStore;

/// Translate an insert failure, mapping a primary-key conflict on the
/// timers table to the domain's conflict error.
fn timer_insert_error(timer_id: TimerId, e: &sqlx::Error) -> TimerError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => TimerError::TimerExists(timer_id),
        _ => TimerError::Storage(e.to_string()),
    }
}

fn storage_error(e: &sqlx::Error) -> TimerError {
    TimerError::Storage(e.to_string())
}

impl Database {
    /// Insert a timer row and its creator's subscriber row atomically.
    async fn insert_timer(&self, creator: UserId, timer: &CreateTimer) -> Result<()> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await.map_err(|e| storage_error(&e))?;

        sqlx::query(
            "INSERT INTO timers \
             (id, utc_offset, creator, end_time, pause_time, kind, name, description, color, \
              with_music, duration, is_paused, created_at) \
             VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(timer.id.to_string())
        .bind(i64::from(timer.utc_offset))
        .bind(creator)
        .bind(timer.end_time)
        .bind(kind_str(timer.kind))
        .bind(&timer.name)
        .bind(&timer.description)
        .bind(color_str(timer.color))
        .bind(i64::from(timer.with_music))
        .bind(timer.duration())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| timer_insert_error(timer.id, &e))?;

        sqlx::query(
            "INSERT INTO timer_subscribers (timer_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(timer.id.to_string())
        .bind(creator)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage_error(&e))?;

        tx.commit().await.map_err(|e| storage_error(&e))?;
        Ok(())
    }

    async fn fetch_timers(&self, query: &str, user_id: UserId, offset: i64, limit: i64) -> Result<Vec<Timer>> {
        let rows = sqlx::query_as::<_, TimerRow>(query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await
            .map_err(|e| storage_error(&e))?;

        rows.into_iter().map(Timer::try_from).collect()
    }
}

#[async_trait]
impl TimerStore for Database {
    async fn insert_date_timer(&self, creator: UserId, timer: &CreateTimer) -> Result<()> {
        self.insert_timer(creator, timer).await
    }

    async fn insert_countdown_timer(&self, creator: UserId, timer: &CreateTimer) -> Result<()> {
        self.insert_timer(creator, timer).await
    }

    async fn update_timer(&self, timer_id: TimerId, settings: &TimerSettings) -> Result<()> {
        let result = sqlx::query(
            "UPDATE timers SET name = ?, description = ?, color = ?, with_music = ?, end_time = ? \
             WHERE id = ?",
        )
        .bind(&settings.name)
        .bind(&settings.description)
        .bind(color_str(settings.color))
        .bind(i64::from(settings.with_music))
        .bind(settings.end_time)
        .bind(timer_id.to_string())
        .execute(self.pool())
        .await
        .map_err(|e| storage_error(&e))?;

        if result.rows_affected() == 0 {
            return Err(TimerError::TimerNotFound(timer_id));
        }
        Ok(())
    }

    async fn delete_timer(&self, timer_id: TimerId) -> Result<()> {
        let result = sqlx::query("DELETE FROM timers WHERE id = ?")
            .bind(timer_id.to_string())
            .execute(self.pool())
            .await
            .map_err(|e| storage_error(&e))?;

        if result.rows_affected() == 0 {
            return Err(TimerError::TimerNotFound(timer_id));
        }
        Ok(())
    }

    async fn timer(&self, timer_id: TimerId) -> Result<Timer> {
        let row = sqlx::query_as::<_, TimerRow>("SELECT * FROM timers WHERE id = ?")
            .bind(timer_id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(|e| storage_error(&e))?
            .ok_or(TimerError::TimerNotFound(timer_id))?;

        Timer::try_from(row)
    }

    async fn countdown_timer(&self, timer_id: TimerId) -> Result<CountdownTimer> {
        let row = sqlx::query_as::<_, TimerRow>(
            "SELECT * FROM timers WHERE id = ? AND kind = 'COUNTDOWN'",
        )
        .bind(timer_id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| storage_error(&e))?
        .ok_or(TimerError::CountdownTimerNotFound(timer_id))?;

        Ok(CountdownTimer {
            timer: Timer::try_from(row)?,
        })
    }

    async fn update_end_time(&self, timer_id: TimerId, end_time: i64) -> Result<()> {
        let result = sqlx::query("UPDATE timers SET end_time = ? WHERE id = ?")
            .bind(end_time)
            .bind(timer_id.to_string())
            .execute(self.pool())
            .await
            .map_err(|e| storage_error(&e))?;

        if result.rows_affected() == 0 {
            return Err(TimerError::TimerNotFound(timer_id));
        }
        Ok(())
    }

    async fn update_pause_time(
        &self,
        timer_id: TimerId,
        pause_time: i64,
        is_paused: bool,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE timers SET pause_time = ?, is_paused = ? WHERE id = ?")
            .bind(pause_time)
            .bind(i64::from(is_paused))
            .bind(timer_id.to_string())
            .execute(self.pool())
            .await
            .map_err(|e| storage_error(&e))?;

        if result.rows_affected() == 0 {
            return Err(TimerError::TimerNotFound(timer_id));
        }
        Ok(())
    }

    async fn subscribe(&self, timer_id: TimerId, user_id: UserId) -> Result<()> {
        sqlx::query(
            "INSERT INTO timer_subscribers (timer_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(timer_id.to_string())
        .bind(user_id)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                TimerError::AlreadySubscriber { timer_id, user_id }
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                TimerError::TimerNotFound(timer_id)
            }
            _ => storage_error(&e),
        })?;
        Ok(())
    }

    async fn unsubscribe(&self, timer_id: TimerId, user_id: UserId) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM timer_subscribers WHERE timer_id = ? AND user_id = ?",
        )
        .bind(timer_id.to_string())
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(|e| storage_error(&e))?;

        if result.rows_affected() == 0 {
            return Err(TimerError::TimerNotFound(timer_id));
        }
        Ok(())
    }

    async fn user_created_timers(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Timer>> {
        self.fetch_timers(
            "SELECT * FROM timers WHERE creator = ? \
             ORDER BY created_at DESC LIMIT ? OFFSET ?",
            user_id,
            offset,
            limit,
        )
        .await
    }

    async fn user_subscriptions(
        &self,
        user_id: UserId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Timer>> {
        self.fetch_timers(
            "SELECT t.* FROM timers t \
             JOIN timer_subscribers s ON s.timer_id = t.id \
             WHERE s.user_id = ? AND t.creator != s.user_id \
             ORDER BY t.created_at DESC LIMIT ? OFFSET ?",
            user_id,
            offset,
            limit,
        )
        .await
    }

    async fn user_timers(&self, user_id: UserId, offset: i64, limit: i64) -> Result<Vec<Timer>> {
        self.fetch_timers(
            "SELECT t.* FROM timers t \
             JOIN timer_subscribers s ON s.timer_id = t.id \
             WHERE s.user_id = ? \
             ORDER BY t.created_at DESC LIMIT ? OFFSET ?",
            user_id,
            offset,
            limit,
        )
        .await
    }

    async fn timers_with_subscribers(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<TimerSubscribers>> {
        // Paused countdown timers hold no tick registration, so the
        // reconciliation pass only needs running timers.
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT id, end_time FROM timers WHERE is_paused = 0 \
             ORDER BY created_at LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await
        .map_err(|e| storage_error(&e))?;

        let mut result = Vec::with_capacity(rows.len());
        for (id, end_time) in rows {
            let timer_id = Uuid::parse_str(&id)
                .map_err(|e| TimerError::Storage(format!("malformed timer id {id}: {e}")))?;
            let subscribers: Vec<UserId> = sqlx::query_scalar(
                "SELECT user_id FROM timer_subscribers WHERE timer_id = ? ORDER BY user_id",
            )
            .bind(&id)
            .fetch_all(self.pool())
            .await
            .map_err(|e| storage_error(&e))?;

            result.push(TimerSubscribers {
                id: timer_id,
                end_time,
                subscribers,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempo_core::error::ErrorKind;
    use tempo_core::model::{TimerColor, TimerKind};

    async fn test_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn create_timer(kind: TimerKind) -> CreateTimer {
        CreateTimer {
            id: Uuid::new_v4(),
            utc_offset: 0,
            start_time: 1_000,
            end_time: 1_600,
            kind,
            name: "tea".into(),
            description: "green, 3 min".into(),
            color: TimerColor::Green,
            with_music: true,
        }
    }

    #[tokio::test]
    async fn insert_and_load_roundtrip() {
        let db = test_db().await;
        let create = create_timer(TimerKind::Countdown);

        db.insert_countdown_timer(7, &create).await.unwrap();

        let timer = db.timer(create.id).await.unwrap();
        assert_eq!(timer.creator, 7);
        assert_eq!(timer.name, "tea");
        assert_eq!(timer.duration, 600);
        assert!(!timer.is_paused);
    }

    #[tokio::test]
    async fn insert_subscribes_the_creator() {
        let db = test_db().await;
        let create = create_timer(TimerKind::Date);

        db.insert_date_timer(7, &create).await.unwrap();

        let timers = db.user_timers(7, 0, 10).await.unwrap();
        assert_eq!(timers.len(), 1);
        // But it is not listed among foreign subscriptions.
        assert!(db.user_subscriptions(7, 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_insert_is_a_conflict() {
        let db = test_db().await;
        let create = create_timer(TimerKind::Date);

        db.insert_date_timer(7, &create).await.unwrap();
        let err = db.insert_date_timer(7, &create).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn missing_timer_is_not_found() {
        let db = test_db().await;
        let err = db.timer(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, TimerError::TimerNotFound(_)));
    }

    #[tokio::test]
    async fn date_timer_is_not_a_countdown_timer() {
        let db = test_db().await;
        let create = create_timer(TimerKind::Date);

        db.insert_date_timer(7, &create).await.unwrap();

        let err = db.countdown_timer(create.id).await.unwrap_err();
        assert!(matches!(err, TimerError::CountdownTimerNotFound(_)));
    }

    #[tokio::test]
    async fn update_settings_and_zero_row_update() {
        let db = test_db().await;
        let create = create_timer(TimerKind::Date);
        db.insert_date_timer(7, &create).await.unwrap();

        let settings = TimerSettings {
            name: "coffee".into(),
            description: String::new(),
            color: TimerColor::Red,
            with_music: false,
            end_time: 2_000,
        };
        db.update_timer(create.id, &settings).await.unwrap();

        let timer = db.timer(create.id).await.unwrap();
        assert_eq!(timer.name, "coffee");
        assert_eq!(timer.end_time, 2_000);

        let err = db.update_timer(Uuid::new_v4(), &settings).await.unwrap_err();
        assert!(matches!(err, TimerError::TimerNotFound(_)));
    }

    #[tokio::test]
    async fn pause_state_roundtrip() {
        let db = test_db().await;
        let create = create_timer(TimerKind::Countdown);
        db.insert_countdown_timer(7, &create).await.unwrap();

        db.update_pause_time(create.id, 1_200, true).await.unwrap();

        let countdown = db.countdown_timer(create.id).await.unwrap();
        assert!(countdown.timer.is_paused);
        assert_eq!(countdown.timer.pause_time, 1_200);
    }

    #[tokio::test]
    async fn double_subscribe_is_a_conflict() {
        let db = test_db().await;
        let create = create_timer(TimerKind::Date);
        db.insert_date_timer(7, &create).await.unwrap();

        db.subscribe(create.id, 8).await.unwrap();
        let err = db.subscribe(create.id, 8).await.unwrap_err();
        assert!(matches!(err, TimerError::AlreadySubscriber { .. }));
    }

    #[tokio::test]
    async fn subscribe_to_missing_timer_is_not_found() {
        let db = test_db().await;
        let err = db.subscribe(Uuid::new_v4(), 8).await.unwrap_err();
        assert!(matches!(err, TimerError::TimerNotFound(_)));
    }

    #[tokio::test]
    async fn delete_cascades_the_subscriber_relation() {
        let db = test_db().await;
        let create = create_timer(TimerKind::Date);
        db.insert_date_timer(7, &create).await.unwrap();
        db.subscribe(create.id, 8).await.unwrap();

        db.delete_timer(create.id).await.unwrap();

        assert!(db.user_timers(8, 0, 10).await.unwrap().is_empty());
        let err = db.delete_timer(create.id).await.unwrap_err();
        assert!(matches!(err, TimerError::TimerNotFound(_)));
    }

    #[tokio::test]
    async fn reconciliation_page_skips_paused_timers() {
        let db = test_db().await;

        let running = create_timer(TimerKind::Countdown);
        db.insert_countdown_timer(7, &running).await.unwrap();
        db.subscribe(running.id, 8).await.unwrap();

        let paused = create_timer(TimerKind::Countdown);
        db.insert_countdown_timer(7, &paused).await.unwrap();
        db.update_pause_time(paused.id, 1_100, true).await.unwrap();

        let page = db.timers_with_subscribers(0, 100).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, running.id);
        assert_eq!(page[0].subscribers, vec![7, 8]);
    }
}
