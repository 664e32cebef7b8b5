//! Authentication and session integration tests.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use compass_core::Role;
use compass_integration_tests::{ADMIN_KEY, DEMO_PASSWORD, PASSWORD, TestContext, client};
use serde_json::{Value, json};

fn set_cookie(response: &reqwest::Response) -> String {
    response.headers()["set-cookie"].to_str().unwrap().to_owned()
}

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_register_sets_session_cookie() {
    let ctx = TestContext::new().await;

    let response = ctx
        .client
        .post(ctx.url("/auth/register"))
        .json(&json!({ "email": "New.User@Example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=604800"));
    assert!(!cookie.contains("Secure"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert!(!body["data"]["token"].as_str().unwrap().is_empty());
    assert_eq!(body["data"]["user"]["email"], "new.user@example.com");
    assert_eq!(body["data"]["user"]["role"], "user");
}

#[tokio::test]
async fn test_register_weak_password_lists_rules() {
    let ctx = TestContext::new().await;

    let response = ctx
        .client
        .post(ctx.url("/auth/register"))
        .json(&json!({ "email": "weak@example.com", "password": "abc" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Password does not meet requirements");
    assert!(body["details"].as_array().unwrap().len() >= 3);
}

#[tokio::test]
async fn test_register_duplicate_is_conflict() {
    let ctx = TestContext::new().await;
    ctx.create_user("taken@example.com", Role::User).await;

    let response = client()
        .post(ctx.url("/auth/register"))
        .json(&json!({ "email": "TAKEN@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn test_admin_role_needs_key_once_an_admin_exists() {
    let ctx = TestContext::new().await;
    ctx.create_user("first@example.com", Role::Admin).await;

    let refused: Value = client()
        .post(ctx.url("/auth/register"))
        .json(&json!({ "email": "second@example.com", "password": PASSWORD, "role": "admin" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(refused["data"]["user"]["role"], "user");

    let granted: Value = client()
        .post(ctx.url("/auth/register"))
        .header("x-admin-key", ADMIN_KEY)
        .json(&json!({ "email": "third@example.com", "password": PASSWORD, "role": "admin" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(granted["data"]["user"]["role"], "admin");
}

#[tokio::test]
async fn test_first_admin_registers_without_key() {
    let ctx = TestContext::new().await;

    let body: Value = client()
        .post(ctx.url("/auth/register"))
        .json(&json!({ "email": "owner@example.com", "password": PASSWORD, "role": "admin" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["user"]["role"], "admin");
}

// =============================================================================
// Login and Sessions
// =============================================================================

#[tokio::test]
async fn test_bad_login_is_generic() {
    let ctx = TestContext::new().await;
    ctx.create_user("known@example.com", Role::User).await;

    let mut errors = Vec::new();
    for (email, password) in [
        ("known@example.com", "Wr0ng!Password"),
        ("unknown@example.com", PASSWORD),
    ] {
        let response = client()
            .post(ctx.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401);
        assert!(!response.headers().contains_key("set-cookie"));
        let body: Value = response.json().await.unwrap();
        errors.push(body["error"].clone());
    }
    assert_eq!(errors[0], errors[1]);
    assert_eq!(errors[0], "Invalid email or password");
}

#[tokio::test]
async fn test_missing_credentials() {
    let ctx = TestContext::new().await;
    let response = client()
        .post(ctx.url("/auth/login"))
        .json(&json!({ "email": "someone@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_me_with_cookie_then_logout() {
    let ctx = TestContext::new().await;
    ctx.create_user("person@example.com", Role::User).await;
    let session = client();
    ctx.login(&session, "person@example.com", PASSWORD).await;

    let me: Value = session
        .get(ctx.url("/auth/me"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["data"]["user"]["email"], "person@example.com");
    assert_eq!(me["data"]["user"]["role"], "user");

    let logout = session.post(ctx.url("/auth/logout")).send().await.unwrap();
    assert_eq!(logout.status(), 200);
    assert!(set_cookie(&logout).contains("Max-Age=0"));

    let after = session.get(ctx.url("/auth/me")).send().await.unwrap();
    assert_eq!(after.status(), 401);
}

#[tokio::test]
async fn test_invalid_bearer_token() {
    let ctx = TestContext::new().await;
    let response = client()
        .get(ctx.url("/auth/me"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_deactivated_account_cannot_log_in() {
    let ctx = TestContext::new().await;
    ctx.create_user("leaver@example.com", Role::User).await;
    let email = compass_core::Email::parse("leaver@example.com").unwrap();
    compass_server::db::UserRepository::set_active(ctx.store.as_ref(), &email, false)
        .await
        .unwrap();

    let response = client()
        .post(ctx.url("/auth/login"))
        .json(&json!({ "email": "leaver@example.com", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

// =============================================================================
// Demo Administrator
// =============================================================================

#[tokio::test]
async fn test_demo_login_resets_preferences() {
    let ctx = TestContext::new().await;
    let demo = client();

    let login = |c: &reqwest::Client| {
        c.post(ctx.url("/auth/login"))
            .json(&json!({
                "email": "anyone@example.com",
                "password": DEMO_PASSWORD,
                "isAdminLogin": true,
            }))
            .send()
    };

    let first: Value = login(&demo).await.unwrap().json().await.unwrap();
    assert_eq!(first["data"]["user"]["role"], "admin");
    assert_eq!(first["data"]["user"]["email"], "example@compass.com");

    let updated = demo
        .put(ctx.url("/user/settings"))
        .json(&json!({
            "notificationEmail": "demo-inbox@example.com",
            "receiveNewComplaints": false,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), 200);

    login(&demo).await.unwrap();
    let prefs: Value = demo
        .get(ctx.url("/user/settings"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(prefs["data"]["notificationEmail"], "");
    assert_eq!(prefs["data"]["receiveNewComplaints"], true);
    assert_eq!(prefs["data"]["receiveStatusUpdates"], true);
}

#[tokio::test]
async fn test_demo_password_without_admin_flag_fails() {
    let ctx = TestContext::new().await;
    let response = client()
        .post(ctx.url("/auth/login"))
        .json(&json!({ "email": "anyone@example.com", "password": DEMO_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}
