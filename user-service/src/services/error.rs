use service_core::error::AppError;
use thiserror::Error;

/// Engine-level error taxonomy. Variants are deliberately coarse where the
/// design calls for a single undifferentiated signal: `Unauthorized` covers
/// both unknown email and wrong password, `InvalidToken` covers every way a
/// refresh token can be unusable, `InvalidOtp` every way a recovery code can.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Invalid refresh token")]
    InvalidToken,

    #[error("Invalid or expired OTP")]
    InvalidOtp,

    #[error("Email is not registered")]
    NotRegistered,

    #[error("Failed to send email: {0}")]
    DeliveryFailed(String),

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("User not found")]
    UserNotFound,
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::Unauthorized => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::InvalidToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid refresh token"))
            }
            ServiceError::InvalidOtp => {
                AppError::BadRequest(anyhow::anyhow!("Invalid or expired OTP"))
            }
            ServiceError::NotRegistered => {
                AppError::BadRequest(anyhow::anyhow!("Email is not registered"))
            }
            ServiceError::DeliveryFailed(e) => AppError::EmailError(e),
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
        }
    }
}
