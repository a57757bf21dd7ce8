//! Argon2id password hashing.
//!
//! Both operations are CPU-bound and run on the blocking pool so they do not
//! stall other requests.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tokio::task;

use crate::config::SecurityConfig;

use super::auth_service::AuthError;

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(config: &SecurityConfig) -> Result<Self, AuthError> {
        let params = Params::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| AuthError::Internal(format!("Invalid Argon2 params: {e}")))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes with a fresh random salt, so equal inputs give different outputs.
    pub async fn hash(&self, plain: &str) -> Result<String, AuthError> {
        let argon2 = self.argon2();
        let plain = plain.to_string();

        task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(plain.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| AuthError::Internal(format!("Failed to hash password: {e}")))
        })
        .await
        .map_err(|e| AuthError::Internal(format!("Password hashing task panicked: {e}")))?
    }

    /// Returns `false` on mismatch or on a hash that cannot be parsed.
    pub async fn verify(&self, plain: &str, hash: &str) -> Result<bool, AuthError> {
        let argon2 = self.argon2();
        let plain = plain.to_string();
        let hash = hash.to_string();

        task::spawn_blocking(move || {
            // Parameters come from the stored hash, not from `self`.
            PasswordHash::new(&hash)
                .is_ok_and(|parsed| argon2.verify_password(plain.as_bytes(), &parsed).is_ok())
        })
        .await
        .map_err(|e| AuthError::Internal(format!("Password verification task panicked: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(&SecurityConfig {
            argon2_memory_cost_kib: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_hash_then_verify() {
        let hasher = hasher();
        let hash = hasher.hash("p1").await.unwrap();

        assert_ne!(hash, "p1");
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("p1", &hash).await.unwrap());
        assert!(!hasher.verify("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_same_password_different_hashes() {
        let hasher = hasher();
        let first = hasher.hash("p1").await.unwrap();
        let second = hasher.hash("p1").await.unwrap();

        assert_ne!(first, second);
        assert!(hasher.verify("p1", &first).await.unwrap());
        assert!(hasher.verify("p1", &second).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_malformed_hash_is_false() {
        let hasher = hasher();
        assert!(!hasher.verify("p1", "not-a-hash").await.unwrap());
        assert!(!hasher.verify("p1", "").await.unwrap());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let result = PasswordHasher::new(&SecurityConfig {
            argon2_memory_cost_kib: 1,
            argon2_time_cost: 0,
            argon2_parallelism: 1,
        });
        assert!(result.is_err());
    }
}
