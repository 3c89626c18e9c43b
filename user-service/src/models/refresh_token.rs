//! Refresh token record - one row per issued refresh credential.
//!
//! Only a SHA-256 digest of the opaque token value is stored; records are
//! revoked (never deleted) so the history of a session chain stays auditable.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub token_id: Uuid,

    /// Owner of this token.
    pub user_id: Uuid,

    /// SHA-256 hex digest of the opaque token value.
    pub token_hash: String,

    pub expires_utc: DateTime<Utc>,

    pub created_utc: DateTime<Utc>,

    /// Set once, never cleared: rotation, logout, or password reset.
    pub revoked: bool,
}

impl RefreshToken {
    /// Create a record for a freshly issued token value.
    pub fn new(user_id: Uuid, token: &str, expires_in_days: i64) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            user_id,
            token_hash: Self::hash_token(token),
            expires_utc: now + Duration::days(expires_in_days),
            created_utc: now,
            revoked: false,
        }
    }

    /// Digest a token value for storage or lookup.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Expiry is derived lazily at read time, never persisted as a state.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_utc
    }

    /// Active = not expired and not revoked.
    pub fn is_active(&self) -> bool {
        !self.is_expired() && !self.revoked
    }
}
