use async_trait::async_trait;

use pedido_core::domain::notification::Notification;
use pedido_core::store::{NotificationAudit, StoreError};

use super::db_error;
use crate::DbPool;

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationAudit for SqlNotificationRepository {
    async fn append(&self, notification: Notification) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO notification \
             (id, recipient, channel, body, priority, notification_type, outcome, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id.0)
        .bind(&notification.recipient)
        .bind(notification.channel.as_str())
        .bind(&notification.body)
        .bind(notification.priority.as_str())
        .bind(&notification.notification_type)
        .bind(notification.outcome.as_str())
        .bind(notification.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}
