//! Domain service for registration, login and the access/refresh token session.
//!
//! The session state of a user is the single refresh token persisted on the
//! user record. Login sets it, refresh rotates it and logout clears it.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::db::User;
use crate::services::token::TokenError;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid user credentials")]
    InvalidCredentials,

    #[error("User does not exist")]
    UserNotFound,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired | TokenError::Invalid => Self::Unauthorized(err.to_string()),
            TokenError::Signing(msg) => Self::Internal(msg),
        }
    }
}

/// Registration fields. Files are local paths of already-received uploads.
#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub avatar: Option<PathBuf>,
    pub cover_image: Option<PathBuf>,
}

/// Login by username or email.
#[derive(Debug, Clone, Default)]
pub struct LoginInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Sanitized user plus the freshly issued token pair.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates a user after validating fields and uploading the avatar.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for blank fields or a missing/failed
    /// avatar, and [`AuthError::Conflict`] if the username or email is taken.
    async fn register(&self, input: RegisterInput) -> Result<User, AuthError>;

    /// Verifies credentials, issues a token pair and persists the refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UserNotFound`] for an unknown identifier and
    /// [`AuthError::InvalidCredentials`] for a wrong password. Neither
    /// changes any stored state.
    async fn login(&self, input: LoginInput) -> Result<LoginResult, AuthError>;

    /// Exchanges the current refresh token for a new pair, invalidating it.
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenPair, AuthError>;

    /// Clears the persisted refresh token.
    async fn logout(&self, user_id: i32) -> Result<(), AuthError>;

    async fn change_password(
        &self,
        user_id: i32,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;

    /// Resolves an access token to the sanitized user it was issued for.
    async fn authenticate(&self, access_token: &str) -> Result<User, AuthError>;
}
