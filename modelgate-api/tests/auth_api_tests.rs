//! HTTP tests for health, token issuance and user management.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use chrono::Duration;
use common::{TestContext, TEST_JWT_SECRET};
use modelgate_shared::auth::jwt::TokenAuthority;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

#[sqlx::test(migrations = "../migrations")]
async fn test_health(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let response = ctx.request(Method::GET, "/health", None, None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["database"], "connected");
    assert!(response.body["timestamp"].is_string());
    assert!(response.headers.get("x-request-id").is_some());
}

#[sqlx::test(migrations = "../migrations")]
async fn test_request_id_is_echoed(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let request = Request::builder()
        .uri("/v1/users/me")
        .header("X-Request-ID", "trace-123")
        .body(Body::empty())
        .unwrap();
    let response = ctx.send(request).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers.get("x-request-id").unwrap(), "trace-123");
}

#[sqlx::test(migrations = "../migrations")]
async fn test_token_from_form(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=alice&password=alice-password"))
        .unwrap();
    let response = ctx.send(request).await;

    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["token_type"], "bearer");
    assert_eq!(response.body["username"], "alice");
    assert_eq!(response.body["is_admin"], false);
    assert_eq!(response.body["user_id"], ctx.user.id.to_string());
    assert_eq!(response.body["expires_in"], 1800);

    // The issued token works on a protected route
    let token = response.body["access_token"].as_str().unwrap();
    let me = ctx.get("/v1/users/me", token).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["username"], "alice");
}

#[sqlx::test(migrations = "../migrations")]
async fn test_token_from_json(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let response = ctx
        .request(
            Method::POST,
            "/v1/token",
            None,
            Some(json!({"username": "admin", "password": "admin-password"})),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["is_admin"], true);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_login_failures_are_indistinguishable(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let wrong_password = ctx
        .request(
            Method::POST,
            "/v1/token",
            None,
            Some(json!({"username": "alice", "password": "alice-passworD"})),
        )
        .await;
    let unknown_user = ctx
        .request(
            Method::POST,
            "/v1/token",
            None,
            Some(json!({"username": "mallory", "password": "alice-password"})),
        )
        .await;

    for response in [&wrong_password, &unknown_user] {
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers.get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
    }
    assert_eq!(wrong_password.body["message"], unknown_user.body["message"]);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_token_requires_fields(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let response = ctx
        .request(Method::POST, "/v1/token", None, Some(json!({"username": "alice"})))
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_inactive_user_cannot_get_token(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let deactivate = ctx
        .put(
            &format!("/v1/users/{}", ctx.user.id),
            &ctx.admin_token,
            json!({"is_active": false}),
        )
        .await;
    assert_eq!(deactivate.status, StatusCode::OK);

    let response = ctx
        .request(
            Method::POST,
            "/v1/token",
            None,
            Some(json!({"username": "alice", "password": "alice-password"})),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["message"], "Inactive user");
}

#[sqlx::test(migrations = "../migrations")]
async fn test_protected_routes_reject_bad_tokens(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let missing = ctx.request(Method::GET, "/v1/models", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.headers.get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");

    let garbage = ctx.get("/v1/models", "not-a-token").await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);

    let foreign = TokenAuthority::new(b"some-other-secret-that-is-32-bytes!!", Duration::minutes(5))
        .issue(ctx.user.id, "alice", true, None)
        .unwrap();
    assert_eq!(ctx.get("/v1/models", &foreign).await.status, StatusCode::UNAUTHORIZED);

    let expired = TokenAuthority::new(TEST_JWT_SECRET.as_bytes(), Duration::minutes(5))
        .issue(ctx.user.id, "alice", false, Some(Duration::seconds(-1)))
        .unwrap();
    let response = ctx.get("/v1/models", &expired).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["message"], "Token has expired");
}

#[sqlx::test(migrations = "../migrations")]
async fn test_register_and_duplicates(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let body = json!({
        "username": "bob",
        "email": "bob@example.com",
        "password": "bob-password",
        "full_name": "Bob"
    });
    let created = ctx.request(Method::POST, "/v1/users", None, Some(body.clone())).await;
    assert_eq!(created.status, StatusCode::OK);
    assert_eq!(created.body["is_admin"], false);
    assert_eq!(created.body["full_name"], "Bob");
    assert!(created.body.get("hashed_password").is_none());

    let duplicate = ctx.request(Method::POST, "/v1/users", None, Some(body)).await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);
    assert_eq!(duplicate.body["message"], "Username already registered");

    let same_email = ctx
        .request(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({
                "username": "bobby",
                "email": "bob@example.com",
                "password": "bob-password"
            })),
        )
        .await;
    assert_eq!(same_email.status, StatusCode::BAD_REQUEST);
    assert_eq!(same_email.body["message"], "Email already registered");
}

#[sqlx::test(migrations = "../migrations")]
async fn test_register_validation(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let response = ctx
        .request(
            Method::POST,
            "/v1/users",
            None,
            Some(json!({
                "username": "carol",
                "email": "not-an-email",
                "password": "short"
            })),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["error"], "validation_error");
    let fields: Vec<&str> = response.body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"password"));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_user_management_permissions(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let listed = ctx.get("/v1/users?limit=1", &ctx.admin_token).await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(listed.body.as_array().unwrap().len(), 1);

    assert_eq!(ctx.get("/v1/users", &ctx.user_token).await.status, StatusCode::FORBIDDEN);
    assert_eq!(
        ctx.get(&format!("/v1/users/{}", ctx.admin.id), &ctx.user_token)
            .await
            .status,
        StatusCode::FORBIDDEN
    );

    let escalate = ctx
        .put(
            &format!("/v1/users/{}", ctx.user.id),
            &ctx.user_token,
            json!({"is_admin": true}),
        )
        .await;
    assert_eq!(escalate.status, StatusCode::FORBIDDEN);

    let reactivate = ctx
        .put(
            &format!("/v1/users/{}", ctx.user.id),
            &ctx.user_token,
            json!({"is_active": true}),
        )
        .await;
    assert_eq!(reactivate.status, StatusCode::FORBIDDEN);

    let rename = ctx
        .put(
            &format!("/v1/users/{}", ctx.user.id),
            &ctx.user_token,
            json!({"full_name": "Alice A."}),
        )
        .await;
    assert_eq!(rename.status, StatusCode::OK);
    assert_eq!(rename.body["full_name"], "Alice A.");

    let cleared = ctx
        .put(
            &format!("/v1/users/{}", ctx.user.id),
            &ctx.user_token,
            json!({"full_name": null}),
        )
        .await;
    assert!(cleared.body["full_name"].is_null());
}

#[sqlx::test(migrations = "../migrations")]
async fn test_delete_user(pool: PgPool) {
    let ctx = TestContext::new(pool).await;

    let own = ctx
        .delete(&format!("/v1/users/{}", ctx.admin.id), &ctx.admin_token)
        .await;
    assert_eq!(own.status, StatusCode::BAD_REQUEST);
    assert_eq!(own.body["message"], "Cannot delete your own account");

    let by_user = ctx
        .delete(&format!("/v1/users/{}", ctx.admin.id), &ctx.user_token)
        .await;
    assert_eq!(by_user.status, StatusCode::FORBIDDEN);

    let deleted = ctx
        .delete(&format!("/v1/users/{}", ctx.user.id), &ctx.admin_token)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let missing = ctx
        .delete(&format!("/v1/users/{}", Uuid::new_v4()), &ctx.admin_token)
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["message"], "User not found");
}
