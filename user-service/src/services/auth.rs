use crate::{
    dtos::auth::{LoginRequest, RegisterRequest, RegisterResponse},
    models::User,
    services::{JwtService, RefreshTokenStore, ServiceError, TokenResponse, UserStore},
    utils::{Password, PasswordHashString, hash_password, verify_password},
};
use base64::Engine;
use chrono::{Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use std::sync::Arc;
use uuid::Uuid;

/// Session lifecycle engine: login, refresh rotation, logout.
///
/// Stateless between calls; all shared state lives behind the injected
/// stores.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    jwt: JwtService,
    refresh_token_expiry_days: i64,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        jwt: JwtService,
        refresh_token_expiry_days: i64,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            jwt,
            refresh_token_expiry_days,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, ServiceError> {
        if self.users.find_by_email(&req.email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let password_hash = hash_password(&Password::new(req.password))?;

        let user = User::new(req.email, password_hash.into_string(), req.display_name);
        self.users.insert(&user).await?;

        tracing::info!(user_id = %user.user_id, "User registered");

        Ok(RegisterResponse {
            user_id: user.user_id,
            message: "User registered successfully.".to_string(),
        })
    }

    pub async fn login(&self, req: LoginRequest) -> Result<TokenResponse, ServiceError> {
        let user = self.users.find_by_email(&req.email).await?;

        // Unknown email and wrong password collapse into one outcome; no
        // signal distinguishes them.
        let user = user.ok_or(ServiceError::Unauthorized)?;
        if !verify_password(
            &Password::new(req.password),
            &PasswordHashString::new(user.password_hash.clone()),
        ) {
            return Err(ServiceError::Unauthorized);
        }

        let access_token = self
            .jwt
            .generate_access_token(user.user_id, &user.email, user.role())?;

        let refresh_token = generate_refresh_token_value();
        let expires_utc = Utc::now() + Duration::days(self.refresh_token_expiry_days);
        self.refresh_tokens
            .create(user.user_id, &refresh_token, expires_utc)
            .await?;

        tracing::info!(user_id = %user.user_id, "User logged in");

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }

    /// Exchange a refresh token for a new pair, revoking the presented one.
    ///
    /// Rotation makes every refresh token single-use: presenting a value
    /// that is unknown, expired, revoked, or superseded fails with the same
    /// `InvalidToken` signal, and the compare-revoke-create step is atomic
    /// in the store so two concurrent calls cannot both succeed.
    pub async fn refresh(&self, presented_token: &str) -> Result<TokenResponse, ServiceError> {
        let owner = self
            .refresh_tokens
            .resolve_owner(presented_token)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        let user = self
            .users
            .find_by_id(owner)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        let access_token = self
            .jwt
            .generate_access_token(user.user_id, &user.email, user.role())?;

        let refresh_token = generate_refresh_token_value();
        let expires_utc = Utc::now() + Duration::days(self.refresh_token_expiry_days);

        let rotated = self
            .refresh_tokens
            .rotate(owner, presented_token, &refresh_token, expires_utc)
            .await?;
        if !rotated {
            return Err(ServiceError::InvalidToken);
        }

        tracing::info!(user_id = %user.user_id, "Refresh token rotated");

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_token_expiry_seconds(),
        })
    }

    /// Revoke every refresh token for the owner. Idempotent: a second call
    /// changes nothing and reports no error.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.refresh_tokens.revoke_all(user_id).await?;
        tracing::info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: String,
        new_password: String,
    ) -> Result<(), ServiceError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        if !verify_password(
            &Password::new(current_password),
            &PasswordHashString::new(user.password_hash.clone()),
        ) {
            return Err(ServiceError::Unauthorized);
        }

        let password_hash = hash_password(&Password::new(new_password))?;
        self.users
            .update_password_hash(user_id, password_hash.as_str())
            .await?;

        // A credential change invalidates every open session
        self.refresh_tokens.revoke_all(user_id).await?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }
}

/// Opaque refresh-token value: 32 bytes from the OS CSPRNG, base64-encoded.
fn generate_refresh_token_value() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
