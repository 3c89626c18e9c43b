use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use service_core::error::AppError;
use utoipa::ToSchema;
use validator::Validate;

use crate::{AppState, middleware::AuthUser, services::UserStore, utils::ValidatedJson};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,

    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Profile returned", body = UserResponse),
        (status = 401, description = "Invalid token", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.0.user_id().map_err(AppError::InternalError)?;

    let user = state
        .users
        .find_by_id(user_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    Ok(Json(user.sanitized()))
}

/// Change the caller's password
#[utoipa::path(
    post,
    path = "/users/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed; all sessions revoked"),
        (status = 401, description = "Current password incorrect", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "User",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user.0.user_id().map_err(AppError::InternalError)?;

    state
        .auth_service
        .change_password(user_id, req.current_password, req.new_password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Password has been updated successfully"
        })),
    ))
}
