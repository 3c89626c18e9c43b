mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{build_app, login, post_json, seed_user, setup};
use user_service::models::{OtpEntry, recovery_key};
use user_service::services::OtpCache;

#[tokio::test]
async fn test_forgot_password_for_unregistered_email_sends_nothing() {
    let ctx = setup();
    let app = build_app(&ctx).await;

    let (status, body) = post_json(
        &app,
        "/auth/forgot-password",
        serde_json::json!({ "email": "bob@example.com" }),
    )
    .await;

    // Recovery deliberately reveals non-registration, unlike login
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email is not registered");
    assert!(ctx.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_password_reset_flow_with_single_use_code() {
    let ctx = setup();
    seed_user(&ctx.store, "bob@example.com", "old_password_123").await;
    let app = build_app(&ctx).await;

    let (status, _) = post_json(
        &app,
        "/auth/forgot-password",
        serde_json::json!({ "email": "bob@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The code went out by email, not in the HTTP response
    let sent = ctx.mailer.sent();
    assert_eq!(sent.len(), 1);
    let (recipient, code) = &sent[0];
    assert_eq!(recipient, "bob@example.com");
    assert_eq!(code.len(), 6);

    let (status, _) = post_json(
        &app,
        "/auth/reset-password",
        serde_json::json!({
            "email": "bob@example.com",
            "otp": code,
            "new_password": "new_password_456"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Old password is gone, new one works
    let (status, _) = post_json(
        &app,
        "/auth/login",
        serde_json::json!({ "email": "bob@example.com", "password": "old_password_123" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    login(&app, "bob@example.com", "new_password_456").await;

    // The code was consumed on success and cannot authorize a second reset
    let (status, _) = post_json(
        &app,
        "/auth/reset-password",
        serde_json::json!({
            "email": "bob@example.com",
            "otp": code,
            "new_password": "yet_another_789"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reset_revokes_existing_sessions() {
    let ctx = setup();
    seed_user(&ctx.store, "carol@example.com", "old_password_123").await;
    let app = build_app(&ctx).await;

    let (_, refresh_token) = login(&app, "carol@example.com", "old_password_123").await;

    let (status, _) = post_json(
        &app,
        "/auth/forgot-password",
        serde_json::json!({ "email": "carol@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let code = ctx.mailer.sent()[0].1.clone();

    let (status, _) = post_json(
        &app,
        "/auth/reset-password",
        serde_json::json!({
            "email": "carol@example.com",
            "otp": code,
            "new_password": "new_password_456"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Sessions opened under the old password are gone
    let (status, _) = post_json(
        &app,
        "/auth/refresh-token",
        serde_json::json!({ "refresh_token": refresh_token }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_code_is_rejected() {
    let ctx = setup();
    seed_user(&ctx.store, "dave@example.com", "old_password_123").await;
    let app = build_app(&ctx).await;

    let (status, _) = post_json(
        &app,
        "/auth/forgot-password",
        serde_json::json!({ "email": "dave@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let code = ctx.mailer.sent()[0].1.clone();

    // Six digits, but not the right six digits
    let wrong_code = if code == "000000" { "000001" } else { "000000" };
    let (status, body) = post_json(
        &app,
        "/auth/reset-password",
        serde_json::json!({
            "email": "dave@example.com",
            "otp": wrong_code,
            "new_password": "new_password_456"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or expired OTP");
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let ctx = setup();
    let user = seed_user(&ctx.store, "erin@example.com", "old_password_123").await;
    let app = build_app(&ctx).await;

    // Plant an already-lapsed entry; lazy expiry must treat it as missing
    let mut entry = OtpEntry::new("123456".to_string(), user.user_id, 10);
    entry.expires_utc = Utc::now() - Duration::seconds(1);
    ctx.otp_cache
        .put(&recovery_key("erin@example.com"), entry)
        .await
        .unwrap();

    let (status, _) = post_json(
        &app,
        "/auth/reset-password",
        serde_json::json!({
            "email": "erin@example.com",
            "otp": "123456",
            "new_password": "new_password_456"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_repeated_request_overwrites_previous_code() {
    let ctx = setup();
    seed_user(&ctx.store, "frank@example.com", "old_password_123").await;
    let app = build_app(&ctx).await;

    for _ in 0..2 {
        let (status, _) = post_json(
            &app,
            "/auth/forgot-password",
            serde_json::json!({ "email": "frank@example.com" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let sent = ctx.mailer.sent();
    assert_eq!(sent.len(), 2);
    let first_code = &sent[0].1;
    let second_code = &sent[1].1;

    // Last request wins
    let cached = ctx
        .otp_cache
        .get(&recovery_key("frank@example.com"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&cached.code, second_code);

    if first_code != second_code {
        let (status, _) = post_json(
            &app,
            "/auth/reset-password",
            serde_json::json!({
                "email": "frank@example.com",
                "otp": first_code,
                "new_password": "new_password_456"
            }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_delivery_failure_surfaces_and_retains_entry() {
    let ctx = setup();
    seed_user(&ctx.store, "grace@example.com", "old_password_123").await;
    let app = build_app(&ctx).await;

    ctx.mailer.set_fail(true);
    let (status, _) = post_json(
        &app,
        "/auth/forgot-password",
        serde_json::json!({ "email": "grace@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    // The cached entry survives the failed delivery and is still usable
    let entry = ctx
        .otp_cache
        .get(&recovery_key("grace@example.com"))
        .await
        .unwrap()
        .expect("entry should be retained after delivery failure");

    let (status, _) = post_json(
        &app,
        "/auth/reset-password",
        serde_json::json!({
            "email": "grace@example.com",
            "otp": entry.code,
            "new_password": "new_password_456"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
