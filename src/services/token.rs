//! Access and refresh token minting and verification (HS256 JWT).
//!
//! Access and refresh tokens are signed with different secrets and carry a
//! `typ` claim; verification checks both, so neither kind is accepted where
//! the other is expected.

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::db::UserRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT payload. Profile fields are only present on access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id as a string
    pub sub: String,
    pub typ: TokenKind,
    pub iat: i64,
    pub exp: i64,
    /// Random per token, so two tokens minted in the same second differ
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl Claims {
    #[must_use]
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl Keys {
    fn new(secret: &str, ttl: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: chrono::Duration::from_std(ttl)?,
        })
    }
}

pub struct TokenService {
    access: Keys,
    refresh: Keys,
    validation: Validation,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> anyhow::Result<Self> {
        if config.access_token_secret.is_empty() || config.refresh_token_secret.is_empty() {
            anyhow::bail!("Token secrets must not be empty");
        }
        if config.access_token_secret == config.refresh_token_secret {
            anyhow::bail!("Access and refresh token secrets must differ");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            access: Keys::new(&config.access_token_secret, config.access_ttl()?)?,
            refresh: Keys::new(&config.refresh_token_secret, config.refresh_ttl()?)?,
            validation,
        })
    }

    const fn keys(&self, kind: TokenKind) -> &Keys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    #[must_use]
    pub fn access_ttl(&self) -> chrono::Duration {
        self.access.ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> chrono::Duration {
        self.refresh.ttl
    }

    pub fn issue_access(&self, user: &UserRecord) -> Result<String, TokenError> {
        let mut claims = self.base_claims(TokenKind::Access, user.id)?;
        claims.email = Some(user.email.clone());
        claims.username = Some(user.username.clone());
        claims.full_name = Some(user.full_name.clone());
        self.sign(&claims)
    }

    pub fn issue_refresh(&self, user_id: i32) -> Result<String, TokenError> {
        let claims = self.base_claims(TokenKind::Refresh, user_id)?;
        self.sign(&claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify(token, TokenKind::Refresh)
    }

    fn base_claims(&self, kind: TokenKind, user_id: i32) -> Result<Claims, TokenError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(self.keys(kind).ttl)
            .ok_or_else(|| TokenError::Signing("token lifetime out of range".to_string()))?;

        Ok(Claims {
            sub: user_id.to_string(),
            typ: kind,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            email: None,
            username: None,
            full_name: None,
        })
    }

    /// Signs `claims` with the secret matching `claims.typ`.
    pub fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.keys(claims.typ).encoding,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.keys(kind).decoding, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            },
        )?;

        if data.claims.typ != kind || data.claims.user_id().is_none() {
            return Err(TokenError::Invalid);
        }

        Ok(data.claims)
    }
}
