use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use service_core::error::AppError;

use crate::{
    AppState,
    dtos::auth::{ForgotPasswordRequest, ResetPasswordRequest},
    utils::ValidatedJson,
};

/// Request a password-reset OTP
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "OTP sent to the registered email"),
        (status = 400, description = "Email is not registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Email delivery failed", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .recovery_service
        .request_reset(&req.email)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Failed to process password reset request");
            e
        })?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "OTP has been sent to your email"
        })),
    ))
}

/// Confirm a password reset with the emailed OTP
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password has been updated"),
        (status = 400, description = "Invalid or expired OTP", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .recovery_service
        .confirm_reset(&req.email, &req.otp, req.new_password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "Password has been updated successfully"
        })),
    ))
}
