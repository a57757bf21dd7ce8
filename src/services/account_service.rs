//! Domain service for account details and channel subscriptions.

use serde::Serialize;
use std::path::Path;
use thiserror::Error;

use crate::db::User;

/// Errors specific to account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AccountError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AccountError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

/// Account fields a user may edit. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

/// Public view of a user as a channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub avatar: String,
    pub cover_image: String,
    pub subscribers_count: u64,
    pub channels_subscribed_to_count: u64,
    pub is_subscribed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    pub subscribed: bool,
    pub subscribers_count: u64,
}

/// Domain service trait for account management.
#[async_trait::async_trait]
pub trait AccountService: Send + Sync {
    async fn current_user(&self, user_id: i32) -> Result<User, AccountError>;

    /// # Errors
    ///
    /// Returns [`AccountError::Validation`] if no field is given and
    /// [`AccountError::Conflict`] if the email belongs to another user.
    async fn update_account(
        &self,
        user_id: i32,
        update: AccountUpdate,
    ) -> Result<User, AccountError>;

    async fn update_avatar(&self, user_id: i32, file: Option<&Path>) -> Result<User, AccountError>;

    async fn update_cover_image(
        &self,
        user_id: i32,
        file: Option<&Path>,
    ) -> Result<User, AccountError>;

    /// Profile of `username` as seen by `viewer_id`.
    async fn channel_profile(
        &self,
        username: &str,
        viewer_id: i32,
    ) -> Result<ChannelProfile, AccountError>;

    /// Subscribes the viewer to the channel, or unsubscribes if already subscribed.
    async fn toggle_subscription(
        &self,
        viewer_id: i32,
        channel_username: &str,
    ) -> Result<SubscriptionState, AccountError>;
}
