use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::upload::MultipartForm;
use super::validation::{validate_email, validate_username};
use super::{ApiError, ApiResponse, AppState, UpdateAccountRequest};
use crate::db::User;
use crate::services::{AccountUpdate, ChannelProfile, SubscriptionState};

/// GET /api/v1/users/current-user
pub async fn current_user(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = state.account_service().current_user(user.id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// PATCH /api/v1/users/update-account
pub async fn update_account(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdateAccountRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    if let Some(email) = &payload.email {
        validate_email(email)?;
    }

    let user = state
        .account_service()
        .update_account(
            user.id,
            AccountUpdate {
                full_name: payload.full_name,
                email: payload.email,
            },
        )
        .await?;

    Ok(Json(
        ApiResponse::success(user).with_message("Account details updated successfully"),
    ))
}

/// PATCH /api/v1/users/avatar (multipart field `avatar`)
pub async fn update_avatar(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let temp_dir = std::path::Path::new(&state.config().media.temp_path);
    let form = MultipartForm::read(multipart, temp_dir).await?;

    let user = state
        .account_service()
        .update_avatar(user.id, form.file("avatar").map(|f| f.path()))
        .await?;

    Ok(Json(
        ApiResponse::success(user).with_message("Avatar updated successfully"),
    ))
}

/// PATCH /api/v1/users/cover-image (multipart field `coverImage`)
pub async fn update_cover_image(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let temp_dir = std::path::Path::new(&state.config().media.temp_path);
    let form = MultipartForm::read(multipart, temp_dir).await?;

    let user = state
        .account_service()
        .update_cover_image(user.id, form.file("coverImage").map(|f| f.path()))
        .await?;

    Ok(Json(
        ApiResponse::success(user).with_message("Cover image updated successfully"),
    ))
}

/// GET /api/v1/users/c/{username}
pub async fn channel_profile(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(viewer)): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<ChannelProfile>>, ApiError> {
    let username = validate_username(&username)?;

    let profile = state
        .account_service()
        .channel_profile(username, viewer.id)
        .await?;

    Ok(Json(ApiResponse::success(profile)))
}

/// POST /api/v1/users/c/{username}/subscribe
pub async fn toggle_subscription(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(viewer)): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<SubscriptionState>>, ApiError> {
    let username = validate_username(&username)?;

    let subscription = state
        .account_service()
        .toggle_subscription(viewer.id, username)
        .await?;

    Ok(Json(ApiResponse::success(subscription)))
}
