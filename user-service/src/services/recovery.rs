use crate::{
    models::{OtpEntry, recovery_key},
    services::{EmailProvider, OtpCache, RefreshTokenStore, ServiceError, UserStore},
    utils::{Password, hash_password},
};
use rand::Rng;
use rand::rngs::OsRng;
use std::sync::Arc;

/// Password recovery engine: OTP issuance, verification, and password
/// replacement for users without a session.
#[derive(Clone)]
pub struct RecoveryService {
    users: Arc<dyn UserStore>,
    otp_cache: Arc<dyn OtpCache>,
    email: Arc<dyn EmailProvider>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    otp_expiry_minutes: i64,
}

impl RecoveryService {
    pub fn new(
        users: Arc<dyn UserStore>,
        otp_cache: Arc<dyn OtpCache>,
        email: Arc<dyn EmailProvider>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        otp_expiry_minutes: i64,
    ) -> Self {
        Self {
            users,
            otp_cache,
            email,
            refresh_tokens,
            otp_expiry_minutes,
        }
    }

    /// Issue a recovery code and hand it to the mail collaborator.
    ///
    /// Unlike login, an unknown email is reported as such: recovery is a
    /// deliberate exception to the uniform-failure policy. Repeated requests
    /// overwrite the cached entry: last request wins.
    pub async fn request_reset(&self, email: &str) -> Result<(), ServiceError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(ServiceError::NotRegistered)?;

        let code = generate_otp_code();
        let entry = OtpEntry::new(code.clone(), user.user_id, self.otp_expiry_minutes);
        self.otp_cache.put(&recovery_key(email), entry).await?;

        // The cached entry is left in place on delivery failure: it expires
        // on its own, and a repeated request overwrites it.
        self.email
            .send_password_reset_otp(&user.email, &code)
            .await
            .map_err(|e| ServiceError::DeliveryFailed(e.to_string()))?;

        tracing::info!(user_id = %user.user_id, "Password reset OTP issued");
        Ok(())
    }

    /// Verify a recovery code and replace the password.
    ///
    /// Missing, expired, and mismatched codes all collapse into
    /// `InvalidOtp`. A successfully verified entry is removed, so a code
    /// can never authorize two resets; every refresh session of the user is
    /// revoked along with the old password.
    pub async fn confirm_reset(
        &self,
        email: &str,
        code: &str,
        new_password: String,
    ) -> Result<(), ServiceError> {
        let key = recovery_key(email);

        let entry = self
            .otp_cache
            .get(&key)
            .await?
            .ok_or(ServiceError::InvalidOtp)?;

        if entry.code != code.trim() {
            return Err(ServiceError::InvalidOtp);
        }

        let user = self
            .users
            .find_by_id(entry.user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let password_hash = hash_password(&Password::new(new_password))?;
        self.users
            .update_password_hash(user.user_id, password_hash.as_str())
            .await?;

        // Single use: consume the entry only after the new hash is durable,
        // so a failed write leaves the code retryable.
        self.otp_cache.remove(&key).await?;

        self.refresh_tokens.revoke_all(user.user_id).await?;

        tracing::info!(user_id = %user.user_id, "Password reset completed");
        Ok(())
    }
}

/// 6-digit recovery code from the OS CSPRNG.
///
/// `gen_range` samples uniformly over the full 6-digit space, so there is
/// no modulo bias to shrink it.
fn generate_otp_code() -> String {
    let n = OsRng.gen_range(0..1_000_000u32);
    format!("{:06}", n)
}
