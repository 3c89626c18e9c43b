//! User model - account identity with credentials and role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role codes. Closed set: registration always produces a `Student`;
/// the `Admin` account is seeded out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Student => "student",
        }
    }

    /// Parse a stored role code. Unknown codes fall back to the least
    /// privileged role rather than failing the read.
    pub fn from_code(code: &str) -> Self {
        match code {
            "admin" => Role::Admin,
            _ => Role::Student,
        }
    }
}

/// User entity. `password_hash` never leaves this type unsanitized.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub role_code: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl User {
    /// Create a new user with the default role.
    pub fn new(email: String, password_hash: String, display_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email,
            password_hash,
            display_name,
            role_code: Role::Student.as_str().to_string(),
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn role(&self) -> Role {
        Role::from_code(&self.role_code)
    }

    /// Convert to a response shape without sensitive fields.
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self.clone())
    }
}

/// User response for the API (no password hash).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub created_utc: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            display_name: u.display_name,
            role: Role::from_code(&u.role_code),
            created_utc: u.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults_to_student() {
        let user = User::new("a@example.com".to_string(), "$argon2...".to_string(), None);
        assert_eq!(user.role(), Role::Student);
    }

    #[test]
    fn test_unknown_role_code_falls_back_to_student() {
        assert_eq!(Role::from_code("superuser"), Role::Student);
        assert_eq!(Role::from_code("admin"), Role::Admin);
    }

    #[test]
    fn test_sanitized_response_has_no_hash() {
        let user = User::new(
            "a@example.com".to_string(),
            "$argon2id$secret".to_string(),
            Some("Alice".to_string()),
        );
        let json = serde_json::to_string(&user.sanitized()).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("a@example.com"));
    }
}
