use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Multipart, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{AppendHeaders, IntoResponse, Response},
};
use std::path::Path;
use std::sync::Arc;

use super::cookies::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie};
use super::upload::MultipartForm;
use super::validation::validate_email;
use super::{
    ApiError, ApiResponse, AppState, ChangePasswordRequest, LoginRequest, RefreshRequest,
};
use crate::db::User;
use crate::services::{LoginInput, LoginResult, RegisterInput, TokenPair};

/// The authenticated user, attached to the request by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Set on the response of an authenticated request so the request span can
/// carry the user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUserId(pub i32);

// ============================================================================
// Middleware
// ============================================================================

/// Authentication middleware that takes the access token from:
/// 1. the `accessToken` cookie
/// 2. the `Authorization: Bearer <token>` header
///
/// The request never reaches the handler unless the token verifies and the
/// user still exists.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = extract_access_token(request.headers()) else {
        return Err(ApiError::unauthorized());
    };

    let user = state.auth_service().authenticate(&token).await.map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        ApiError::from(e)
    })?;

    let user_id = user.id;
    request.extensions_mut().insert(CurrentUser(user));

    let mut response = next.run(request).await;
    response
        .extensions_mut()
        .insert(AuthenticatedUserId(user_id));
    Ok(response)
}

fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = get_cookie(headers, ACCESS_COOKIE_NAME) {
        return Some(token);
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
        && !token.trim().is_empty()
    {
        return Some(token.trim().to_string());
    }

    None
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/users/register
/// Multipart form: `fullName`, `email`, `username`, `password`, `avatar` file
/// and an optional `coverImage` file.
pub async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let temp_dir = Path::new(&state.config().media.temp_path);
    let form = MultipartForm::read(multipart, temp_dir).await?;

    let email = form.text("email");
    validate_email(&email)?;

    let user = state
        .auth_service()
        .register(RegisterInput {
            full_name: form.text("fullName"),
            email,
            username: form.text("username"),
            password: form.text("password"),
            avatar: form.file_path("avatar"),
            cover_image: form.file_path("coverImage"),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(user).with_message("User registered successfully")),
    ))
}

/// POST /api/v1/users/login
/// Accepts `username` or `email` plus `password`; sets both session cookies.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result: LoginResult = state
        .auth_service()
        .login(LoginInput {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    Ok((
        AppendHeaders(state.cookies.session(&result.tokens)),
        Json(ApiResponse::success(result).with_message("User logged in successfully")),
    ))
}

/// POST /api/v1/users/refresh-token
/// Token from the `refreshToken` cookie, else from the JSON body.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let incoming = match get_cookie(&headers, REFRESH_COOKIE_NAME) {
        Some(token) => Some(token),
        None if body.is_empty() => None,
        None => serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|e| ApiError::validation(format!("Invalid request body: {e}")))?
            .refresh_token,
    };

    let tokens: TokenPair = state.auth_service().refresh(incoming.as_deref()).await?;

    Ok((
        AppendHeaders(state.cookies.session(&tokens)),
        Json(ApiResponse::success(tokens).with_message("Access token refreshed")),
    ))
}

/// POST /api/v1/users/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth_service().logout(user.id).await?;

    Ok((
        AppendHeaders(state.cookies.cleared()),
        Json(ApiResponse::message("User logged out")),
    ))
}

/// POST /api/v1/users/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state
        .auth_service()
        .change_password(user.id, &payload.old_password, &payload.new_password)
        .await?;

    Ok(Json(ApiResponse::message("Password changed successfully")))
}
