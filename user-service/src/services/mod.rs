//! Services layer: business-logic engines and the collaborators they
//! depend on (stores, cache, mailer, token signer).

mod auth;
mod database;
mod email;
pub mod error;
mod jwt;
mod recovery;
pub mod redis;

pub use auth::AuthService;
pub use database::{Database, MemoryStore, RefreshTokenStore, UserStore};
pub use email::{EmailProvider, EmailService, MockEmailService};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, TokenResponse};
pub use recovery::RecoveryService;
pub use redis::{MemoryOtpCache, OtpCache, RedisOtpCache};
