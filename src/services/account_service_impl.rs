//! `SeaORM` implementation of the `AccountService` trait.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::db::{CredentialStore, ProfileChanges, Store, User, UserRecord};
use crate::services::account_service::{
    AccountError, AccountService, AccountUpdate, ChannelProfile, SubscriptionState,
};
use crate::services::media::MediaStore;

pub struct SeaOrmAccountService {
    store: Store,
    media: Arc<dyn MediaStore>,
}

impl SeaOrmAccountService {
    #[must_use]
    pub fn new(store: Store, media: Arc<dyn MediaStore>) -> Self {
        Self { store, media }
    }

    async fn find_channel(&self, username: &str) -> Result<UserRecord, AccountError> {
        let username = username.trim().to_lowercase();
        if username.is_empty() {
            return Err(AccountError::Validation("Username is missing".to_string()));
        }

        self.store
            .get_user_by_username(&username)
            .await?
            .ok_or_else(|| AccountError::NotFound("Channel does not exist".to_string()))
    }

    async fn apply(&self, user_id: i32, changes: ProfileChanges) -> Result<User, AccountError> {
        self.store
            .update_user_profile(user_id, changes)
            .await?
            .map(User::from)
            .ok_or_else(|| AccountError::NotFound("User does not exist".to_string()))
    }

    async fn upload(&self, file: Option<&Path>, what: &str) -> Result<String, AccountError> {
        let Some(file) = file else {
            return Err(AccountError::Validation(format!("{what} file is missing")));
        };

        self.media
            .upload(file)
            .await
            .ok_or_else(|| AccountError::Validation(format!("Error while uploading {what}")))
    }
}

#[async_trait]
impl AccountService for SeaOrmAccountService {
    async fn current_user(&self, user_id: i32) -> Result<User, AccountError> {
        self.store
            .find_by_id(user_id)
            .await?
            .map(User::from)
            .ok_or_else(|| AccountError::NotFound("User does not exist".to_string()))
    }

    async fn update_account(
        &self,
        user_id: i32,
        update: AccountUpdate,
    ) -> Result<User, AccountError> {
        let full_name = update
            .full_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let email = update
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        if full_name.is_none() && email.is_none() {
            return Err(AccountError::Validation(
                "Full name or email is required".to_string(),
            ));
        }

        if let Some(email) = &email
            && self.store.email_taken_by_other(email, user_id).await?
        {
            return Err(AccountError::Conflict("Email is already in use".to_string()));
        }

        let user = self
            .apply(
                user_id,
                ProfileChanges {
                    full_name,
                    email,
                    ..Default::default()
                },
            )
            .await?;

        info!(user_id, "Account details updated");
        Ok(user)
    }

    async fn update_avatar(&self, user_id: i32, file: Option<&Path>) -> Result<User, AccountError> {
        let avatar = self.upload(file, "Avatar").await?;
        self.apply(
            user_id,
            ProfileChanges {
                avatar: Some(avatar),
                ..Default::default()
            },
        )
        .await
    }

    async fn update_cover_image(
        &self,
        user_id: i32,
        file: Option<&Path>,
    ) -> Result<User, AccountError> {
        let cover_image = self.upload(file, "Cover image").await?;
        self.apply(
            user_id,
            ProfileChanges {
                cover_image: Some(cover_image),
                ..Default::default()
            },
        )
        .await
    }

    async fn channel_profile(
        &self,
        username: &str,
        viewer_id: i32,
    ) -> Result<ChannelProfile, AccountError> {
        let channel = self.find_channel(username).await?;

        let (subscribers_count, channels_subscribed_to_count, is_subscribed) = tokio::try_join!(
            self.store.count_subscribers(channel.id),
            self.store.count_subscriptions(channel.id),
            self.store.is_subscribed(viewer_id, channel.id),
        )?;

        Ok(ChannelProfile {
            id: channel.id,
            username: channel.username,
            full_name: channel.full_name,
            email: channel.email,
            avatar: channel.avatar,
            cover_image: channel.cover_image,
            subscribers_count,
            channels_subscribed_to_count,
            is_subscribed,
        })
    }

    async fn toggle_subscription(
        &self,
        viewer_id: i32,
        channel_username: &str,
    ) -> Result<SubscriptionState, AccountError> {
        let channel = self.find_channel(channel_username).await?;
        if channel.id == viewer_id {
            return Err(AccountError::Validation(
                "Cannot subscribe to your own channel".to_string(),
            ));
        }

        let subscribed = if self.store.unsubscribe(viewer_id, channel.id).await? {
            false
        } else {
            self.store.subscribe(viewer_id, channel.id).await?;
            true
        };

        info!(viewer_id, channel_id = channel.id, subscribed, "Subscription toggled");

        Ok(SubscriptionState {
            subscribed,
            subscribers_count: self.store.count_subscribers(channel.id).await?,
        })
    }
}
