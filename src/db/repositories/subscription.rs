use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, Set,
};

use crate::entities::subscriptions;

pub struct SubscriptionRepository {
    conn: DatabaseConnection,
}

impl SubscriptionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn count_subscribers(&self, channel_id: i32) -> Result<u64> {
        subscriptions::Entity::find()
            .filter(subscriptions::Column::ChannelId.eq(channel_id))
            .count(&self.conn)
            .await
            .context("Failed to count subscribers")
    }

    pub async fn count_subscriptions(&self, subscriber_id: i32) -> Result<u64> {
        subscriptions::Entity::find()
            .filter(subscriptions::Column::SubscriberId.eq(subscriber_id))
            .count(&self.conn)
            .await
            .context("Failed to count subscriptions")
    }

    pub async fn is_subscribed(&self, subscriber_id: i32, channel_id: i32) -> Result<bool> {
        let row = subscriptions::Entity::find()
            .filter(subscriptions::Column::SubscriberId.eq(subscriber_id))
            .filter(subscriptions::Column::ChannelId.eq(channel_id))
            .one(&self.conn)
            .await
            .context("Failed to query subscription")?;

        Ok(row.is_some())
    }

    pub async fn subscribe(&self, subscriber_id: i32, channel_id: i32) -> Result<()> {
        let active = subscriptions::ActiveModel {
            id: NotSet,
            subscriber_id: Set(subscriber_id),
            channel_id: Set(channel_id),
            created_at: Set(chrono::Utc::now().to_rfc3339()),
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to insert subscription")?;

        Ok(())
    }

    pub async fn unsubscribe(&self, subscriber_id: i32, channel_id: i32) -> Result<bool> {
        let result = subscriptions::Entity::delete_many()
            .filter(subscriptions::Column::SubscriberId.eq(subscriber_id))
            .filter(subscriptions::Column::ChannelId.eq(channel_id))
            .exec(&self.conn)
            .await
            .context("Failed to delete subscription")?;

        Ok(result.rows_affected > 0)
    }
}
