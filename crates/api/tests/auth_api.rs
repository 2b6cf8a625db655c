//! Integration tests for registration and login.

mod common;

use axum::http::StatusCode;
use common::{body_json, post_json};
use sqlx::PgPool;

#[sqlx::test(migrations = "../db/migrations")]
async fn register_creates_user(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/auth/register",
        serde_json::json!({
            "username": "alice",
            "email": "alice@test.com",
            "password": "correct horse battery"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["username"], "alice");
    assert_eq!(json["email"], "alice@test.com");
    assert!(json.get("password_hash").is_none());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn register_rejects_duplicate_username(pool: PgPool) {
    let body = serde_json::json!({
        "username": "alice",
        "email": "alice@test.com",
        "password": "correct horse battery"
    });

    let app = common::build_test_app(pool.clone());
    let response = post_json(app, "/api/v1/auth/register", body.clone()).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let app = common::build_test_app(pool);
    let response = post_json(app, "/api/v1/auth/register", body).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["code"], "CONFLICT");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn register_rejects_short_password(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/auth/register",
        serde_json::json!({
            "username": "alice",
            "email": "alice@test.com",
            "password": "short"
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn login_returns_usable_token(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    post_json(
        app,
        "/api/v1/auth/register",
        serde_json::json!({
            "username": "alice",
            "email": "alice@test.com",
            "password": "correct horse battery"
        }),
    )
    .await;

    let app = common::build_test_app(pool.clone());
    let response = post_json(
        app,
        "/api/v1/auth/login",
        serde_json::json!({ "username": "alice", "password": "correct horse battery" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let token = json["access_token"].as_str().unwrap().to_string();
    assert!(json["expires_in"].as_i64().unwrap() > 0);
    assert_eq!(json["user"]["username"], "alice");

    // The issued token authenticates a protected route.
    let app = common::build_test_app(pool);
    let response = common::get_auth(app, "/api/v1/projects", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn login_rejects_wrong_password(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    post_json(
        app,
        "/api/v1/auth/register",
        serde_json::json!({
            "username": "alice",
            "email": "alice@test.com",
            "password": "correct horse battery"
        }),
    )
    .await;

    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/auth/login",
        serde_json::json!({ "username": "alice", "password": "wrong password" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn login_rejects_unknown_user(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/auth/login",
        serde_json::json!({ "username": "ghost", "password": "whatever at all" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
