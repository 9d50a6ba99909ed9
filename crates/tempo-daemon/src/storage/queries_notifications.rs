//! Notification inbox queries.
//!
//! The inbox stores the full notification payload as JSON so the stored
//! copy replays exactly what an online subscriber would have received.

use async_trait::async_trait;

use tempo_core::db::unix_timestamp;
use tempo_core::error::{Result, TimerError};
use tempo_core::model::UserId;
use tempo_core::model::notification::Notification;

use super::db::Database;
use super::models::NotificationRow;
use crate::store::NotificationStore;

#[async_trait]
impl NotificationStore for Database {
    async fn insert_notification(
        &self,
        user_id: UserId,
        notification: &Notification,
    ) -> Result<()> {
        let payload = serde_json::to_string(notification)
            .map_err(|e| TimerError::Storage(format!("notification encode: {e}")))?;

        sqlx::query("INSERT INTO notifications (user_id, payload, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(payload)
            .bind(unix_timestamp())
            .execute(self.pool())
            .await
            .map_err(|e| TimerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn user_notifications(&self, user_id: UserId) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| TimerError::Storage(e.to_string()))?;

        rows.iter()
            .map(|row| {
                serde_json::from_str(&row.payload)
                    .map_err(|e| TimerError::Storage(format!("notification decode: {e}")))
            })
            .collect()
    }

    async fn delete_user_notifications(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM notifications WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool())
            .await
            .map_err(|e| TimerError::Storage(e.to_string()))?;
        Ok(())
    }
}
