//! Session cookies carrying the access and refresh tokens.

use axum::http::{HeaderMap, HeaderName, header};
use cookie::{Cookie, SameSite};

use crate::config::Config;
use crate::services::TokenPair;

pub const ACCESS_COOKIE_NAME: &str = "accessToken";
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Attributes shared by both session cookies. `Max-Age` follows the token TTLs.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub secure: bool,
    pub access_max_age: time::Duration,
    pub refresh_max_age: time::Duration,
}

impl CookieSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            secure: config.server.secure_cookies,
            access_max_age: time::Duration::try_from(config.auth.access_ttl()?)?,
            refresh_max_age: time::Duration::try_from(config.auth.refresh_ttl()?)?,
        })
    }

    fn build(&self, name: &'static str, value: String, max_age: time::Duration) -> String {
        Cookie::build((name, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(max_age)
            .build()
            .to_string()
    }

    /// `Set-Cookie` headers for a freshly issued pair.
    #[must_use]
    pub fn session(&self, tokens: &TokenPair) -> [(HeaderName, String); 2] {
        [
            (
                header::SET_COOKIE,
                self.build(
                    ACCESS_COOKIE_NAME,
                    tokens.access_token.clone(),
                    self.access_max_age,
                ),
            ),
            (
                header::SET_COOKIE,
                self.build(
                    REFRESH_COOKIE_NAME,
                    tokens.refresh_token.clone(),
                    self.refresh_max_age,
                ),
            ),
        ]
    }

    /// `Set-Cookie` headers that expire both cookies.
    #[must_use]
    pub fn cleared(&self) -> [(HeaderName, String); 2] {
        [
            (
                header::SET_COOKIE,
                self.build(ACCESS_COOKIE_NAME, String::new(), time::Duration::ZERO),
            ),
            (
                header::SET_COOKIE,
                self.build(REFRESH_COOKIE_NAME, String::new(), time::Duration::ZERO),
            ),
        ]
    }
}

/// Reads a cookie value from the request's `Cookie` headers.
#[must_use]
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn settings() -> CookieSettings {
        CookieSettings {
            secure: true,
            access_max_age: time::Duration::minutes(15),
            refresh_max_age: time::Duration::days(10),
        }
    }

    #[test]
    fn test_session_cookie_attributes() {
        let [(_, access), (_, refresh)] = settings().session(&TokenPair {
            access_token: "a.b.c".to_string(),
            refresh_token: "d.e.f".to_string(),
        });

        assert!(access.starts_with("accessToken=a.b.c"));
        assert!(access.contains("HttpOnly"));
        assert!(access.contains("Secure"));
        assert!(access.contains("SameSite=Lax"));
        assert!(access.contains("Path=/"));
        assert!(access.contains("Max-Age=900"));

        assert!(refresh.starts_with("refreshToken=d.e.f"));
        assert!(refresh.contains("Max-Age=864000"));
    }

    #[test]
    fn test_cleared_cookies_expire_immediately() {
        let [(_, access), (_, refresh)] = settings().cleared();
        assert!(access.starts_with("accessToken=;"));
        assert!(access.contains("Max-Age=0"));
        assert!(refresh.starts_with("refreshToken=;"));
    }

    #[test]
    fn test_insecure_cookies_for_local_development() {
        let mut settings = settings();
        settings.secure = false;
        let [(_, access), _] = settings.cleared();
        assert!(!access.contains("Secure"));
    }

    #[test]
    fn test_get_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; accessToken=tok; refreshToken="),
        );

        assert_eq!(get_cookie(&headers, "accessToken").as_deref(), Some("tok"));
        assert_eq!(get_cookie(&headers, "refreshToken"), None);
        assert_eq!(get_cookie(&headers, "missing"), None);
    }
}
