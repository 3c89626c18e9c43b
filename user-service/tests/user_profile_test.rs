mod common;

use axum::http::StatusCode;
use common::{build_app, get_with_bearer, login, post_json, post_json_with_bearer, seed_user, setup};

#[tokio::test]
async fn test_get_me_returns_sanitized_profile() {
    let ctx = setup();
    let user = seed_user(&ctx.store, "alice@example.com", "secret123456").await;
    let app = build_app(&ctx).await;

    let (access_token, _) = login(&app, "alice@example.com", "secret123456").await;

    let (status, body) = get_with_bearer(&app, "/users/me", Some(&access_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user.user_id.to_string());
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["role"], "student");
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_get_me_requires_valid_token() {
    let ctx = setup();
    let app = build_app(&ctx).await;

    let (status, _) = get_with_bearer(&app, "/users/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_with_bearer(&app, "/users/me", Some("garbage-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_change_password_rotates_credentials_and_sessions() {
    let ctx = setup();
    seed_user(&ctx.store, "alice@example.com", "old_password_123").await;
    let app = build_app(&ctx).await;

    let (access_token, refresh_token) = login(&app, "alice@example.com", "old_password_123").await;

    // Wrong current password is rejected
    let (status, _) = post_json_with_bearer(
        &app,
        "/users/me/password",
        serde_json::json!({
            "current_password": "not-the-password",
            "new_password": "new_password_456"
        }),
        Some(&access_token),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Correct current password succeeds
    let (status, _) = post_json_with_bearer(
        &app,
        "/users/me/password",
        serde_json::json!({
            "current_password": "old_password_123",
            "new_password": "new_password_456"
        }),
        Some(&access_token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Open sessions were revoked along with the old credential
    let (status, _) = post_json(
        &app,
        "/auth/refresh-token",
        serde_json::json!({ "refresh_token": refresh_token }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Old password no longer works, new one does
    let (status, _) = post_json(
        &app,
        "/auth/login",
        serde_json::json!({ "email": "alice@example.com", "password": "old_password_123" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    login(&app, "alice@example.com", "new_password_456").await;
}
