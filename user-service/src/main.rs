use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use user_service::{
    AppState, build_router,
    config::ServiceConfig,
    services::{
        AuthService, Database, EmailService, JwtService, RecoveryService, RedisOtpCache,
    },
};

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = ServiceConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting user-management service"
    );

    // Initialize database connection
    let pool = user_service::db::create_pool(&config.database).await?;
    user_service::db::run_migrations(&pool)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
    let db = Database::new(pool);
    tracing::info!("Database initialized successfully");

    // Initialize the volatile OTP cache
    let otp_cache = RedisOtpCache::new(&config.redis).await?;
    let otp_cache = Arc::new(otp_cache);
    tracing::info!("OTP cache initialized");

    // Initialize email service
    let email = Arc::new(EmailService::new(&config.smtp)?);
    tracing::info!("Email service initialized");

    // Initialize JWT service
    let jwt = JwtService::new(&config.jwt);
    tracing::info!("JWT service initialized");

    // Initialize rate limiters
    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let password_reset_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.password_reset_attempts,
        config.rate_limit.password_reset_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );
    tracing::info!("Rate limiters initialized: Login, Password Reset, and Global IP");

    // Initialize engines; both stores are the same Postgres database
    let db = Arc::new(db);
    let auth_service = AuthService::new(
        db.clone(),
        db.clone(),
        jwt.clone(),
        config.jwt.refresh_token_expiry_days,
    );
    let recovery_service = RecoveryService::new(
        db.clone(),
        otp_cache,
        email,
        db.clone(),
        config.recovery.otp_expiry_minutes,
    );

    let state = AppState {
        config: config.clone(),
        users: db,
        jwt,
        auth_service,
        recovery_service,
        login_rate_limiter,
        password_reset_rate_limiter,
        ip_rate_limiter,
    };

    // Build application router
    let app = build_router(state).await?;

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
