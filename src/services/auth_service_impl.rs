//! JWT implementation of the `AuthService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{CredentialStore, NewUser, User, UserRecord};
use crate::services::auth_service::{
    AuthError, AuthService, LoginInput, LoginResult, RegisterInput, TokenPair,
};
use crate::services::media::MediaStore;
use crate::services::password::PasswordHasher;
use crate::services::token::TokenService;

pub struct JwtAuthService {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    tokens: Arc<TokenService>,
    media: Arc<dyn MediaStore>,
}

impl JwtAuthService {
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        tokens: Arc<TokenService>,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            media,
        }
    }

    /// Mints both tokens before anything is written, so a signing failure
    /// leaves the stored refresh token alone.
    fn issue_pair(&self, user: &UserRecord) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.tokens.issue_access(user)?,
            refresh_token: self.tokens.issue_refresh(user.id)?,
        })
    }
}

fn normalize_identifier(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn rejected_refresh() -> AuthError {
    AuthError::Unauthorized("Refresh token is expired or used".to_string())
}

#[async_trait]
impl AuthService for JwtAuthService {
    async fn register(&self, input: RegisterInput) -> Result<User, AuthError> {
        let fields = [
            &input.full_name,
            &input.email,
            &input.username,
            &input.password,
        ];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(AuthError::Validation("All fields are required".to_string()));
        }

        let username = input.username.trim().to_lowercase();
        let email = input.email.trim().to_lowercase();

        if self
            .store
            .exists_by_username_or_email(&username, &email)
            .await?
        {
            return Err(AuthError::Conflict(
                "User with email or username already exists".to_string(),
            ));
        }

        let Some(avatar_file) = input.avatar.as_deref() else {
            return Err(AuthError::Validation("Avatar file is required".to_string()));
        };
        let password_hash = self.hasher.hash(&input.password).await?;

        let Some(avatar) = self.media.upload(avatar_file).await else {
            return Err(AuthError::Validation("Avatar file is required".to_string()));
        };

        let cover_image = match input.cover_image.as_deref() {
            Some(path) => self.media.upload(path).await.unwrap_or_default(),
            None => String::new(),
        };

        let new_user = NewUser {
            username,
            email,
            full_name: input.full_name.trim().to_string(),
            avatar: avatar.clone(),
            cover_image: cover_image.clone(),
            password_hash,
        };

        let created = match self.store.create(new_user).await {
            Ok(Some(record)) => record,
            outcome => {
                self.media.remove(&avatar).await;
                if !cover_image.is_empty() {
                    self.media.remove(&cover_image).await;
                }
                return Err(match outcome {
                    Err(e) => AuthError::from(e),
                    Ok(_) => AuthError::Conflict(
                        "User with email or username already exists".to_string(),
                    ),
                });
            }
        };

        info!(user_id = created.id, username = %created.username, "User registered");
        Ok(User::from(created))
    }

    async fn login(&self, input: LoginInput) -> Result<LoginResult, AuthError> {
        let username = normalize_identifier(input.username);
        let email = normalize_identifier(input.email);

        if username.is_none() && email.is_none() {
            return Err(AuthError::Validation(
                "Username or email is required".to_string(),
            ));
        }

        let user = self
            .store
            .find_by_username_or_email(username.as_deref(), email.as_deref())
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self.hasher.verify(&input.password, &user.password_hash).await? {
            warn!(user_id = user.id, "Login failed: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.issue_pair(&user)?;
        self.store
            .update_refresh_token(user.id, Some(&tokens.refresh_token))
            .await?;

        info!(user_id = user.id, "Login succeeded");
        Ok(LoginResult {
            user: User::from(user),
            tokens,
        })
    }

    async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenPair, AuthError> {
        let Some(incoming) = refresh_token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Err(AuthError::Unauthorized("Unauthorized request".to_string()));
        };

        let claims = self
            .tokens
            .verify_refresh(incoming)
            .map_err(|_| AuthError::Unauthorized("Invalid refresh token".to_string()))?;
        let user_id = claims.user_id().ok_or_else(rejected_refresh)?;

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("Invalid refresh token".to_string()))?;

        if user.refresh_token.as_deref() != Some(incoming) {
            warn!(user_id, "Refresh token reuse or revoked token presented");
            return Err(rejected_refresh());
        }

        let tokens = self.issue_pair(&user)?;

        // Conditional write: only one of several concurrent refreshes wins.
        if !self
            .store
            .rotate_refresh_token(user_id, incoming, &tokens.refresh_token)
            .await?
        {
            warn!(user_id, "Refresh token rotated concurrently");
            return Err(rejected_refresh());
        }

        info!(user_id, "Refresh token rotated");
        Ok(tokens)
    }

    async fn logout(&self, user_id: i32) -> Result<(), AuthError> {
        self.store.update_refresh_token(user_id, None).await?;
        info!(user_id, "Logged out");
        Ok(())
    }

    async fn change_password(
        &self,
        user_id: i32,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.trim().is_empty() {
            return Err(AuthError::Validation(
                "New password is required".to_string(),
            ));
        }

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self.hasher.verify(old_password, &user.password_hash).await? {
            warn!(user_id, "Password change rejected: wrong old password");
            return Err(AuthError::InvalidCredentials);
        }

        let password_hash = self.hasher.hash(new_password).await?;
        self.store
            .update_password_hash(user_id, &password_hash)
            .await?;

        info!(user_id, "Password changed");
        Ok(())
    }

    async fn authenticate(&self, access_token: &str) -> Result<User, AuthError> {
        let claims = self
            .tokens
            .verify_access(access_token)
            .map_err(|_| AuthError::Unauthorized("Invalid access token".to_string()))?;

        let user_id = claims
            .user_id()
            .ok_or_else(|| AuthError::Unauthorized("Invalid access token".to_string()))?;

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("Invalid access token".to_string()))?;

        Ok(User::from(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, SecurityConfig};
    use crate::db::Store;
    use crate::services::media::LocalMediaStore;
    use std::path::PathBuf;

    struct Harness {
        service: Arc<JwtAuthService>,
        store: Store,
        dir: tempfile::TempDir,
    }

    impl Harness {
        async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let url = format!("sqlite:{}", dir.path().join("auth.db").display());
            let store = Store::with_pool_options(&url, 1, 1).await.unwrap();

            let hasher = PasswordHasher::new(&SecurityConfig {
                argon2_memory_cost_kib: 1024,
                argon2_time_cost: 1,
                argon2_parallelism: 1,
            })
            .unwrap();
            let tokens = TokenService::new(&AuthConfig {
                access_token_secret: "access-secret".to_string(),
                access_token_expiry: "15m".to_string(),
                refresh_token_secret: "refresh-secret".to_string(),
                refresh_token_expiry: "10d".to_string(),
            })
            .unwrap();
            let media = LocalMediaStore::new(dir.path().join("media"), "/media");

            let service = Arc::new(JwtAuthService::new(
                Arc::new(store.clone()),
                hasher,
                Arc::new(tokens),
                Arc::new(media),
            ));

            Self {
                service,
                store,
                dir,
            }
        }

        async fn temp_file(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            tokio::fs::write(&path, b"img").await.unwrap();
            path
        }

        async fn register(&self, username: &str, email: &str, password: &str) -> User {
            let avatar = self.temp_file(&format!("{username}-avatar.png")).await;
            self.service
                .register(RegisterInput {
                    full_name: "Alice".to_string(),
                    email: email.to_string(),
                    username: username.to_string(),
                    password: password.to_string(),
                    avatar: Some(avatar),
                    cover_image: None,
                })
                .await
                .unwrap()
        }

        async fn login(&self, username: &str, password: &str) -> Result<LoginResult, AuthError> {
            self.service
                .login(LoginInput {
                    username: Some(username.to_string()),
                    email: None,
                    password: password.to_string(),
                })
                .await
        }

        async fn stored_refresh(&self, id: i32) -> Option<String> {
            self.store.find_by_id(id).await.unwrap().unwrap().refresh_token
        }
    }

    #[tokio::test]
    async fn test_register_hashes_password_and_normalizes() {
        let h = Harness::new().await;
        let user = h.register("  Alice ", "A@X.com", "p1").await;

        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "a@x.com");
        assert!(user.avatar.starts_with("/media/"));
        assert_eq!(user.cover_image, "");

        let record = h.store.find_by_id(user.id).await.unwrap().unwrap();
        assert_ne!(record.password_hash, "p1");
        assert!(record.refresh_token.is_none());
    }

    /// Reports every username and email as free, as a concurrent
    /// registration would before its insert lands.
    struct StaleExistenceCheck(Store);

    #[async_trait]
    impl CredentialStore for StaleExistenceCheck {
        async fn find_by_username_or_email(
            &self,
            username: Option<&str>,
            email: Option<&str>,
        ) -> anyhow::Result<Option<UserRecord>> {
            self.0.find_by_username_or_email(username, email).await
        }

        async fn exists_by_username_or_email(
            &self,
            _username: &str,
            _email: &str,
        ) -> anyhow::Result<bool> {
            Ok(false)
        }

        async fn find_by_id(&self, id: i32) -> anyhow::Result<Option<UserRecord>> {
            self.0.find_by_id(id).await
        }

        async fn create(&self, new_user: NewUser) -> anyhow::Result<Option<UserRecord>> {
            self.0.create(new_user).await
        }

        async fn update_refresh_token(&self, id: i32, token: Option<&str>) -> anyhow::Result<bool> {
            self.0.update_refresh_token(id, token).await
        }

        async fn rotate_refresh_token(
            &self,
            id: i32,
            expected: &str,
            replacement: &str,
        ) -> anyhow::Result<bool> {
            self.0.rotate_refresh_token(id, expected, replacement).await
        }

        async fn update_password_hash(&self, id: i32, password_hash: &str) -> anyhow::Result<bool> {
            self.0.update_password_hash(id, password_hash).await
        }
    }

    #[tokio::test]
    async fn test_register_conflict_on_insert_discards_stored_media() {
        let h = Harness::new().await;
        h.register("alice", "a@x.com", "p1").await;

        let media_dir = h.dir.path().join("media");
        let stored_before = std::fs::read_dir(&media_dir).unwrap().count();

        let service = JwtAuthService::new(
            Arc::new(StaleExistenceCheck(h.store.clone())),
            PasswordHasher::new(&SecurityConfig {
                argon2_memory_cost_kib: 1024,
                argon2_time_cost: 1,
                argon2_parallelism: 1,
            })
            .unwrap(),
            h.service.tokens.clone(),
            h.service.media.clone(),
        );

        let result = service
            .register(RegisterInput {
                full_name: "Other".to_string(),
                email: "a@x.com".to_string(),
                username: "alice".to_string(),
                password: "p1".to_string(),
                avatar: Some(h.temp_file("race-avatar.png").await),
                cover_image: Some(h.temp_file("race-cover.png").await),
            })
            .await;

        assert!(matches!(result, Err(AuthError::Conflict(_))));
        assert_eq!(std::fs::read_dir(&media_dir).unwrap().count(), stored_before);
    }

    #[tokio::test]
    async fn test_same_password_different_stored_hashes() {
        let h = Harness::new().await;
        let alice = h.register("alice", "a@x.com", "p1").await;
        let bob = h.register("bob", "b@x.com", "p1").await;

        let a = h.store.find_by_id(alice.id).await.unwrap().unwrap();
        let b = h.store.find_by_id(bob.id).await.unwrap().unwrap();
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let h = Harness::new().await;
        h.register("alice", "a@x.com", "p1").await;

        let blank = h
            .service
            .register(RegisterInput {
                full_name: "   ".to_string(),
                email: "c@x.com".to_string(),
                username: "carol".to_string(),
                password: "p1".to_string(),
                avatar: Some(h.temp_file("c.png").await),
                cover_image: None,
            })
            .await;
        assert!(matches!(blank, Err(AuthError::Validation(_))));

        let duplicate = h
            .service
            .register(RegisterInput {
                full_name: "Other".to_string(),
                email: "other@x.com".to_string(),
                username: "ALICE".to_string(),
                password: "p1".to_string(),
                avatar: Some(h.temp_file("d.png").await),
                cover_image: None,
            })
            .await;
        assert!(matches!(duplicate, Err(AuthError::Conflict(_))));

        let no_avatar = h
            .service
            .register(RegisterInput {
                full_name: "Carol".to_string(),
                email: "c@x.com".to_string(),
                username: "carol".to_string(),
                password: "p1".to_string(),
                avatar: None,
                cover_image: None,
            })
            .await;
        assert!(matches!(no_avatar, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn test_login_outcomes() {
        let h = Harness::new().await;
        let user = h.register("alice", "a@x.com", "p1").await;

        let missing = h
            .service
            .login(LoginInput {
                username: Some("  ".to_string()),
                email: None,
                password: "p1".to_string(),
            })
            .await;
        assert!(matches!(missing, Err(AuthError::Validation(_))));

        assert!(matches!(
            h.login("nobody", "p1").await,
            Err(AuthError::UserNotFound)
        ));

        let by_email = h
            .service
            .login(LoginInput {
                username: None,
                email: Some("A@x.com".to_string()),
                password: "p1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(by_email.user.id, user.id);
        assert_eq!(
            h.stored_refresh(user.id).await.as_deref(),
            Some(by_email.tokens.refresh_token.as_str())
        );
    }

    #[tokio::test]
    async fn test_wrong_password_leaves_refresh_token_unchanged() {
        let h = Harness::new().await;
        let user = h.register("alice", "a@x.com", "p1").await;
        let session = h.login("alice", "p1").await.unwrap();

        assert!(matches!(
            h.login("alice", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert_eq!(
            h.stored_refresh(user.id).await,
            Some(session.tokens.refresh_token)
        );
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_old_token_is_rejected() {
        let h = Harness::new().await;
        h.register("alice", "a@x.com", "p1").await;
        let session = h.login("alice", "p1").await.unwrap();
        let original = session.tokens.refresh_token;

        let rotated = h.service.refresh(Some(&original)).await.unwrap();
        assert_ne!(rotated.refresh_token, original);
        assert!(h.service.authenticate(&rotated.access_token).await.is_ok());

        assert!(matches!(
            h.service.refresh(Some(&original)).await,
            Err(AuthError::Unauthorized(_))
        ));
        assert!(h.service.refresh(Some(&rotated.refresh_token)).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh_token() {
        let h = Harness::new().await;
        let user = h.register("alice", "a@x.com", "p1").await;
        let session = h.login("alice", "p1").await.unwrap();

        h.service.logout(user.id).await.unwrap();
        assert!(h.stored_refresh(user.id).await.is_none());
        assert!(matches!(
            h.service.refresh(Some(&session.tokens.refresh_token)).await,
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_missing_and_access_tokens() {
        let h = Harness::new().await;
        h.register("alice", "a@x.com", "p1").await;
        let session = h.login("alice", "p1").await.unwrap();

        assert!(matches!(
            h.service.refresh(None).await,
            Err(AuthError::Unauthorized(_))
        ));
        assert!(matches!(
            h.service.refresh(Some(&session.tokens.access_token)).await,
            Err(AuthError::Unauthorized(_))
        ));
        assert!(matches!(
            h.service.authenticate(&session.tokens.refresh_token).await,
            Err(AuthError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_has_one_winner() {
        let h = Harness::new().await;
        let user = h.register("alice", "a@x.com", "p1").await;
        let session = h.login("alice", "p1").await.unwrap();
        let token = session.tokens.refresh_token;

        let (a, b) = tokio::join!(
            h.service.refresh(Some(&token)),
            h.service.refresh(Some(&token))
        );

        let winners: Vec<_> = [a, b].into_iter().filter_map(Result::ok).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(
            h.stored_refresh(user.id).await,
            Some(winners[0].refresh_token.clone())
        );
    }

    #[tokio::test]
    async fn test_change_password() {
        let h = Harness::new().await;
        let user = h.register("alice", "a@x.com", "p1").await;

        assert!(matches!(
            h.service.change_password(user.id, "wrong", "p2").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            h.service.change_password(user.id, "p1", " ").await,
            Err(AuthError::Validation(_))
        ));

        h.service.change_password(user.id, "p1", "p2").await.unwrap();
        assert!(matches!(
            h.login("alice", "p1").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(h.login("alice", "p2").await.is_ok());
    }
}
