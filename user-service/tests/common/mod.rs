#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use service_core::config as core_config;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use std::sync::Arc;
use tower::util::ServiceExt;
use user_service::{
    AppState,
    config::{
        DatabaseConfig, Environment, JwtConfig, RateLimitConfig, RecoveryConfig, RedisConfig,
        SecurityConfig, ServiceConfig, SmtpConfig,
    },
    models::User,
    services::{
        AuthService, JwtService, MemoryOtpCache, MemoryStore, MockEmailService, RecoveryService,
        UserStore,
    },
    utils::{Password, hash_password},
};

/// Everything a test needs to drive the service end to end: the app state
/// plus direct handles on the in-memory collaborators.
pub struct TestContext {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub otp_cache: Arc<MemoryOtpCache>,
    pub mailer: Arc<MockEmailService>,
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        common: core_config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "user-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        jwt: JwtConfig {
            secret: "integration-test-secret-0123456789abcdef".to_string(),
            issuer: "http://issuer.test".to_string(),
            audience: "http://audience.test".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from_address: "no-reply@localhost".to_string(),
        },
        recovery: RecoveryConfig {
            otp_expiry_minutes: 10,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            password_reset_attempts: 1000,
            password_reset_window_seconds: 60,
            global_ip_limit: 10000,
            global_ip_window_seconds: 60,
        },
        swagger_enabled: false,
    }
}

pub fn setup() -> TestContext {
    // Initialize tracing if not already initialized
    let _ = tracing_subscriber::fmt().with_env_filter("error").try_init();

    let config = test_config();

    let store = Arc::new(MemoryStore::new());
    let otp_cache = Arc::new(MemoryOtpCache::new());
    let mailer = Arc::new(MockEmailService::new());
    let jwt = JwtService::new(&config.jwt);

    let auth_service = AuthService::new(
        store.clone(),
        store.clone(),
        jwt.clone(),
        config.jwt.refresh_token_expiry_days,
    );
    let recovery_service = RecoveryService::new(
        store.clone(),
        otp_cache.clone(),
        mailer.clone(),
        store.clone(),
        config.recovery.otp_expiry_minutes,
    );

    let state = AppState {
        config,
        users: store.clone(),
        jwt,
        auth_service,
        recovery_service,
        login_rate_limiter: create_ip_rate_limiter(1000, 60),
        password_reset_rate_limiter: create_ip_rate_limiter(1000, 60),
        ip_rate_limiter: create_ip_rate_limiter(10000, 60),
    };

    TestContext {
        state,
        store,
        otp_cache,
        mailer,
    }
}

pub async fn build_app(ctx: &TestContext) -> Router {
    user_service::build_router(ctx.state.clone())
        .await
        .expect("Failed to build router")
}

pub async fn seed_user(store: &MemoryStore, email: &str, password: &str) -> User {
    let password_hash = hash_password(&Password::new(password.to_string())).unwrap();
    let user = User::new(
        email.to_string(),
        password_hash.into_string(),
        Some("Test User".to_string()),
    );
    store.insert(&user).await.unwrap();
    user
}

/// POST a JSON body and return status plus parsed response body.
pub async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post_json_with_bearer(app, uri, body, None).await
}

pub async fn post_json_with_bearer(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
    bearer: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .extension(axum::extract::ConnectInfo(std::net::SocketAddr::from((
            [127, 0, 0, 1],
            8080,
        ))));

    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}

pub async fn get_with_bearer(
    app: &Router,
    uri: &str,
    bearer: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .extension(axum::extract::ConnectInfo(std::net::SocketAddr::from((
            [127, 0, 0, 1],
            8080,
        ))));

    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}

/// Login through the HTTP surface and return (access_token, refresh_token).
pub async fn login(app: &Router, email: &str, password: &str) -> (String, String) {
    let (status, body) = post_json(
        app,
        "/auth/login",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}
