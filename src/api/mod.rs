use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, patch, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Store;
use crate::services::{AccountService, AuthService};
use crate::state::SharedState;

pub mod auth;
pub mod cookies;
mod error;
mod observability;
mod types;
mod upload;
mod users;
mod validation;

pub use auth::CurrentUser;
pub use cookies::{ACCESS_COOKIE_NAME, CookieSettings, REFRESH_COOKIE_NAME};
pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub cookies: CookieSettings,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth_service(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn account_service(&self) -> &Arc<dyn AccountService> {
        &self.shared.account_service
    }
}

pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let cookies = CookieSettings::from_config(&shared.config)?;

    Ok(Arc::new(AppState {
        shared,
        cookies,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    create_app_state(shared, prometheus_handle)
}

pub fn router(state: Arc<AppState>) -> Router {
    let config = state.config();

    let cors_layer = cors_layer(&config.server.cors_allowed_origins);
    let body_limit = config.server.body_limit_bytes;
    let media_dir = ServeDir::new(&config.media.storage_path);
    let public_dir = ServeDir::new(&config.server.public_path);
    let media_mount = config.media.public_base_url.clone();

    let api_router = Router::new()
        .nest("/users", users_router(state.clone()))
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .with_state(state.clone());

    let mut app = Router::new()
        .route("/health", get(observability::health))
        .route("/metrics", get(observability::get_metrics))
        .with_state(state)
        .nest("/api/v1", api_router);

    // Only a local path prefix can be mounted
    if media_mount.starts_with('/') && media_mount != "/" {
        app = app.nest_service(media_mount.trim_end_matches('/'), media_dir);
    }

    app.fallback_service(public_dir)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

fn users_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .route("/logout", post(auth::logout))
        .route("/change-password", post(auth::change_password))
        .route("/current-user", get(users::current_user))
        .route("/update-account", patch(users::update_account))
        .route("/avatar", patch(users::update_avatar))
        .route("/cover-image", patch(users::update_cover_image))
        .route("/c/{username}", get(users::channel_profile))
        .route("/c/{username}/subscribe", post(users::toggle_subscription))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware));

    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh-token", post(auth::refresh_token))
        .merge(protected)
}

/// Credentialed CORS cannot use a wildcard origin, so `*` mirrors the request origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|s| s.parse().ok()).collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}
