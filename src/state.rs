use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AccountService, AuthService, JwtAuthService, LocalMediaStore, MediaStore, PasswordHasher,
    SeaOrmAccountService, TokenService,
};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub media: Arc<dyn MediaStore>,

    pub auth_service: Arc<dyn AuthService>,

    pub account_service: Arc<dyn AccountService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        Self::with_store(config, store)
    }

    /// Wires the services around an already-connected store.
    pub fn with_store(config: Config, store: Store) -> anyhow::Result<Self> {
        let media =
            Arc::new(LocalMediaStore::from_config(&config.media)) as Arc<dyn MediaStore>;

        let hasher = PasswordHasher::new(&config.security)
            .map_err(|e| anyhow::anyhow!("Failed to configure password hashing: {e}"))?;
        let tokens = Arc::new(TokenService::new(&config.auth)?);

        let auth_service = Arc::new(JwtAuthService::new(
            Arc::new(store.clone()),
            hasher,
            tokens,
            media.clone(),
        )) as Arc<dyn AuthService>;

        let account_service = Arc::new(SeaOrmAccountService::new(store.clone(), media.clone()))
            as Arc<dyn AccountService>;

        Ok(Self {
            config: Arc::new(config),
            store,
            media,
            auth_service,
            account_service,
        })
    }
}
