use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use repositories::user::{NewUser, ProfileChanges, User, UserRecord};

/// Persistence operations the session layer relies on.
///
/// Implemented by [`Store`]; kept as a trait so the coordinator never
/// depends on a particular query language.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserRecord>>;

    async fn exists_by_username_or_email(&self, username: &str, email: &str) -> Result<bool> {
        Ok(self
            .find_by_username_or_email(Some(username), Some(email))
            .await?
            .is_some())
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<UserRecord>>;

    /// Returns `None` if the username or email is already in use.
    async fn create(&self, new_user: NewUser) -> Result<Option<UserRecord>>;

    async fn update_refresh_token(&self, id: i32, token: Option<&str>) -> Result<bool>;

    /// Compare-and-swap on the stored refresh token.
    async fn rotate_refresh_token(&self, id: i32, expected: &str, replacement: &str)
    -> Result<bool>;

    async fn update_password_hash(&self, id: i32, password_hash: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:").trim_start_matches("//");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    #[must_use]
    pub fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    #[must_use]
    pub fn subscription_repo(&self) -> repositories::subscription::SubscriptionRepository {
        repositories::subscription::SubscriptionRepository::new(self.conn.clone())
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        self.user_repo().find_by_username(username).await
    }

    pub async fn update_user_profile(
        &self,
        id: i32,
        changes: ProfileChanges,
    ) -> Result<Option<UserRecord>> {
        self.user_repo().update_profile(id, changes).await
    }

    pub async fn email_taken_by_other(&self, email: &str, id: i32) -> Result<bool> {
        self.user_repo().email_taken_by_other(email, id).await
    }

    pub async fn count_subscribers(&self, channel_id: i32) -> Result<u64> {
        self.subscription_repo().count_subscribers(channel_id).await
    }

    pub async fn count_subscriptions(&self, subscriber_id: i32) -> Result<u64> {
        self.subscription_repo()
            .count_subscriptions(subscriber_id)
            .await
    }

    pub async fn is_subscribed(&self, subscriber_id: i32, channel_id: i32) -> Result<bool> {
        self.subscription_repo()
            .is_subscribed(subscriber_id, channel_id)
            .await
    }

    pub async fn subscribe(&self, subscriber_id: i32, channel_id: i32) -> Result<()> {
        self.subscription_repo()
            .subscribe(subscriber_id, channel_id)
            .await
    }

    pub async fn unsubscribe(&self, subscriber_id: i32, channel_id: i32) -> Result<bool> {
        self.subscription_repo()
            .unsubscribe(subscriber_id, channel_id)
            .await
    }
}

#[async_trait]
impl CredentialStore for Store {
    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<UserRecord>> {
        self.user_repo()
            .find_by_username_or_email(username, email)
            .await
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<UserRecord>> {
        self.user_repo().find_by_id(id).await
    }

    async fn create(&self, new_user: NewUser) -> Result<Option<UserRecord>> {
        self.user_repo().create(new_user).await
    }

    async fn update_refresh_token(&self, id: i32, token: Option<&str>) -> Result<bool> {
        self.user_repo().update_refresh_token(id, token).await
    }

    async fn rotate_refresh_token(
        &self,
        id: i32,
        expected: &str,
        replacement: &str,
    ) -> Result<bool> {
        self.user_repo()
            .rotate_refresh_token(id, expected, replacement)
            .await
    }

    async fn update_password_hash(&self, id: i32, password_hash: &str) -> Result<bool> {
        self.user_repo()
            .update_password_hash(id, password_hash)
            .await
    }
}
