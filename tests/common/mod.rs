#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;
use vidhub::config::Config;
use vidhub::state::SharedState;

pub const ACCESS_SECRET: &str = "test-access-secret";
pub const REFRESH_SECRET: &str = "test-refresh-secret";

const BOUNDARY: &str = "vidhub-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub shared: Arc<SharedState>,
    pub dir: tempfile::TempDir,
}

pub struct Reply {
    pub status: StatusCode,
    pub set_cookies: Vec<String>,
    pub json: serde_json::Value,
}

impl Reply {
    /// Value of a cookie set by the response, if any.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let prefix = format!("{name}=");
        self.set_cookies.iter().find_map(|c| {
            c.strip_prefix(&prefix)
                .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
        })
    }

    pub fn set_cookie_line(&self, name: &str) -> Option<&String> {
        let prefix = format!("{name}=");
        self.set_cookies.iter().find(|c| c.starts_with(&prefix))
    }
}

pub fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", dir.join("test.db").display());
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.auth.access_token_secret = ACCESS_SECRET.to_string();
    config.auth.refresh_token_secret = REFRESH_SECRET.to_string();
    config.auth.access_token_expiry = "15m".to_string();
    config.auth.refresh_token_expiry = "10d".to_string();
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config.media.storage_path = dir.join("media").display().to_string();
    config.media.temp_path = dir.join("temp").display().to_string();
    config.media.public_base_url = "/media".to_string();
    config.server.public_path = dir.join("public").display().to_string();
    config.observability.metrics_enabled = false;
    config
}

pub async fn spawn_app() -> TestApp {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = test_config(dir.path());

    let shared = Arc::new(
        SharedState::new(config)
            .await
            .expect("failed to create shared state"),
    );
    let state =
        vidhub::api::create_app_state(shared.clone(), None).expect("failed to create app state");
    let router = vidhub::api::router(state);

    TestApp {
        router,
        shared,
        dir,
    }
}

pub async fn into_reply(response: Response<axum::body::Body>) -> Reply {
    let status = response.status();
    let set_cookies = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(ToString::to_string))
        .collect();

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };

    Reply {
        status,
        set_cookies,
        json,
    }
}

pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str)]) -> (String, Vec<u8>) {
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }

    for (name, file_name) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"\x89PNG fake image bytes");
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.unwrap();
        into_reply(response).await
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Reply {
        let (content_type, body) = multipart_body(
            &[
                ("fullName", "Alice"),
                ("email", email),
                ("username", username),
                ("password", password),
            ],
            &[("avatar", "avatar.png")],
        );

        self.send(
            Request::builder()
                .method("POST")
                .uri("/api/v1/users/register")
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    pub async fn login(&self, username: &str, password: &str) -> Reply {
        self.post_json(
            "/api/v1/users/login",
            serde_json::json!({ "username": username, "password": password }),
            None,
        )
        .await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: serde_json::Value,
        cookie: Option<&str>,
    ) -> Reply {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }

        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub fn refresh_request(cookie: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/users/refresh-token")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    pub async fn get_with_bearer(&self, uri: &str, token: &str) -> Reply {
        self.send(
            Request::builder()
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn stored_refresh_token(&self, user_id: i32) -> Option<String> {
        use vidhub::db::CredentialStore;

        self.shared
            .store
            .find_by_id(user_id)
            .await
            .unwrap()
            .expect("user should exist")
            .refresh_token
    }
}
