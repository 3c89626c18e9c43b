//! One-time password entry for the recovery flow.
//!
//! Entries live only in the volatile OTP cache, keyed by the normalized
//! requesting email. An entry is consumed exactly once on successful
//! verification or left to lapse; expiry is checked lazily at read time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpEntry {
    /// 6 decimal digits.
    pub code: String,

    /// Identity the code was issued for.
    pub user_id: Uuid,

    pub expires_utc: DateTime<Utc>,
}

impl OtpEntry {
    pub fn new(code: String, user_id: Uuid, expires_in_minutes: i64) -> Self {
        Self {
            code,
            user_id,
            expires_utc: Utc::now() + Duration::minutes(expires_in_minutes),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_utc
    }
}

/// Cache key for a recovery request. Emails compare case-insensitively,
/// so two spellings of the same address must hit the same entry.
pub fn recovery_key(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_entry_expiry() {
        let mut entry = OtpEntry::new("123456".to_string(), Uuid::new_v4(), 10);
        assert!(!entry.is_expired());

        entry.expires_utc = Utc::now() - Duration::seconds(1);
        assert!(entry.is_expired());
    }

    #[test]
    fn test_recovery_key_normalizes_case_and_whitespace() {
        assert_eq!(recovery_key(" Alice@Example.COM "), "alice@example.com");
        assert_eq!(recovery_key("alice@example.com"), "alice@example.com");
    }
}
