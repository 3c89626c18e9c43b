//! Persistence layer: repository traits plus the PostgreSQL implementation.
//!
//! The engines only ever see the traits, so tests (and any future backend)
//! can swap in the in-memory implementation at the bottom of this file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::models::{RefreshToken, User};
use crate::services::ServiceError;

/// Identity lookup and persistence.
///
/// Lookups return `None` for missing records instead of failing; writes are
/// durable before the call returns.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    /// Email comparison is case-insensitive.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;

    async fn insert(&self, user: &User) -> Result<(), ServiceError>;

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError>;
}

/// Refresh-token records keyed by owner.
///
/// Records are only ever created or revoked, never deleted; expiry is
/// derived at read time. At most one unrevoked, unexpired record per owner
/// is treated as active.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn create(
        &self,
        user_id: Uuid,
        token: &str,
        expires_utc: DateTime<Utc>,
    ) -> Result<(), ServiceError>;

    /// The currently active record for an owner, if any.
    async fn find_active(&self, user_id: Uuid) -> Result<Option<RefreshToken>, ServiceError>;

    /// Revoke every record for an owner. Idempotent.
    async fn revoke_all(&self, user_id: Uuid) -> Result<(), ServiceError>;

    /// Map a presented token value back to its owner, requiring the record
    /// to be unrevoked and unexpired. Expired, revoked, and unknown tokens
    /// are indistinguishable: all report `None`.
    async fn resolve_owner(&self, token: &str) -> Result<Option<Uuid>, ServiceError>;

    /// Atomic rotation: compare the presented token against the owner's
    /// active record and, only on a match, revoke every record for the
    /// owner and persist the replacement. Returns `false` (no state
    /// change) on mismatch. Two concurrent calls for the same owner cannot
    /// both succeed.
    async fn rotate(
        &self,
        user_id: Uuid,
        presented_token: &str,
        new_token: &str,
        expires_utc: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;
}

fn digests_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for Database {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn insert(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, password_hash, display_name, role_code, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.role_code)
        .bind(user.created_utc)
        .bind(user.updated_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, updated_utc = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for Database {
    async fn create(
        &self,
        user_id: Uuid,
        token: &str,
        expires_utc: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_id, user_id, token_hash, expires_utc, created_utc, revoked)
            VALUES ($1, $2, $3, $4, NOW(), FALSE)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(RefreshToken::hash_token(token))
        .bind(expires_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active(&self, user_id: Uuid) -> Result<Option<RefreshToken>, ServiceError> {
        let record = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT * FROM refresh_tokens
            WHERE user_id = $1 AND NOT revoked AND expires_utc > NOW()
            ORDER BY created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn revoke_all(&self, user_id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND NOT revoked")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn resolve_owner(&self, token: &str) -> Result<Option<Uuid>, ServiceError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM refresh_tokens
            WHERE token_hash = $1 AND NOT revoked AND expires_utc > NOW()
            "#,
        )
        .bind(RefreshToken::hash_token(token))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(user_id,)| user_id))
    }

    async fn rotate(
        &self,
        user_id: Uuid,
        presented_token: &str,
        new_token: &str,
        expires_utc: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the active record: of two concurrent rotations for
        // the same owner, the second blocks here and then sees a revoked
        // chain, failing the match.
        let active: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT token_hash FROM refresh_tokens
            WHERE user_id = $1 AND NOT revoked AND expires_utc > NOW()
            ORDER BY created_utc DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let presented_hash = RefreshToken::hash_token(presented_token);
        let matches = match active {
            Some((active_hash,)) => digests_match(&active_hash, &presented_hash),
            None => false,
        };

        if !matches {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND NOT revoked")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_id, user_id, token_hash, expires_utc, created_utc, revoked)
            VALUES ($1, $2, $3, $4, NOW(), FALSE)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(RefreshToken::hash_token(new_token))
        .bind(expires_utc)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

/// In-memory store used by tests. A single mutex over the token list makes
/// `rotate` a critical section, matching the transactional guarantee of the
/// PostgreSQL implementation.
#[derive(Default)]
pub struct MemoryStore {
    users: std::sync::Mutex<Vec<User>>,
    tokens: std::sync::Mutex<Vec<RefreshToken>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_users(&self) -> Result<std::sync::MutexGuard<'_, Vec<User>>, ServiceError> {
        self.users
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("User store mutex poisoned: {}", e)))
    }

    fn lock_tokens(&self) -> Result<std::sync::MutexGuard<'_, Vec<RefreshToken>>, ServiceError> {
        self.tokens.lock().map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Token store mutex poisoned: {}", e))
        })
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self
            .lock_users()?
            .iter()
            .find(|u| u.user_id == user_id)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(self
            .lock_users()?
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn insert(&self, user: &User) -> Result<(), ServiceError> {
        self.lock_users()?.push(user.clone());
        Ok(())
    }

    async fn update_password_hash(
        &self,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        let mut users = self.lock_users()?;
        if let Some(user) = users.iter_mut().find(|u| u.user_id == user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_utc = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn create(
        &self,
        user_id: Uuid,
        token: &str,
        expires_utc: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut record = RefreshToken::new(user_id, token, 0);
        record.expires_utc = expires_utc;
        self.lock_tokens()?.push(record);
        Ok(())
    }

    async fn find_active(&self, user_id: Uuid) -> Result<Option<RefreshToken>, ServiceError> {
        Ok(self
            .lock_tokens()?
            .iter()
            .filter(|t| t.user_id == user_id && t.is_active())
            .max_by_key(|t| t.created_utc)
            .cloned())
    }

    async fn revoke_all(&self, user_id: Uuid) -> Result<(), ServiceError> {
        for token in self
            .lock_tokens()?
            .iter_mut()
            .filter(|t| t.user_id == user_id)
        {
            token.revoked = true;
        }
        Ok(())
    }

    async fn resolve_owner(&self, token: &str) -> Result<Option<Uuid>, ServiceError> {
        let hash = RefreshToken::hash_token(token);
        Ok(self
            .lock_tokens()?
            .iter()
            .find(|t| t.is_active() && digests_match(&t.token_hash, &hash))
            .map(|t| t.user_id))
    }

    async fn rotate(
        &self,
        user_id: Uuid,
        presented_token: &str,
        new_token: &str,
        expires_utc: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let mut tokens = self.lock_tokens()?;

        let presented_hash = RefreshToken::hash_token(presented_token);
        let matches = tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.is_active())
            .max_by_key(|t| t.created_utc)
            .map(|t| digests_match(&t.token_hash, &presented_hash))
            .unwrap_or(false);

        if !matches {
            return Ok(false);
        }

        for token in tokens.iter_mut().filter(|t| t.user_id == user_id) {
            token.revoked = true;
        }

        let mut record = RefreshToken::new(user_id, new_token, 0);
        record.expires_utc = expires_utc;
        tokens.push(record);

        Ok(true)
    }
}
