//! Email notification and settings integration tests.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use compass_core::Role;
use compass_integration_tests::{PASSWORD, TestContext, client, test_config};
use compass_server::services::email::MemoryMailer;
use serde_json::{Value, json};

// =============================================================================
// Lifecycle Notifications
// =============================================================================

#[tokio::test]
async fn test_new_complaint_notifies_admin_address() {
    let ctx = TestContext::new().await;
    ctx.configure_mail().await;

    ctx.submit("Wi-Fi down").await;

    let sent = ctx.wait_for_mail(1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ops@example.com");
    assert_eq!(sent[0].subject, "New Complaint Received - Wi-Fi down");
    assert!(sent[0].text.contains("No internet for 2 days in room 4"));
}

#[tokio::test]
async fn test_nothing_sent_when_mail_unconfigured() {
    let ctx = TestContext::new().await;
    ctx.submit("Wi-Fi down").await;
    assert!(ctx.settle_mail().await.is_empty());
}

#[tokio::test]
async fn test_status_change_notifies_with_previous_status() {
    let ctx = TestContext::new().await;
    ctx.configure_mail().await;
    let admin = ctx.admin_client("boss@example.com").await;

    // Opt the administrator out of new-complaint mail only.
    admin
        .put(ctx.url("/user/settings"))
        .json(&json!({ "receiveNewComplaints": false }))
        .send()
        .await
        .unwrap();

    let created = ctx.submit("Wi-Fi down").await;
    assert_eq!(ctx.wait_for_mail(1).await.len(), 1);

    let url = ctx.url(&format!("/complaints/{}", created["id"].as_str().unwrap()));
    let response = admin
        .patch(&url)
        .json(&json!({ "status": "Resolved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let sent = ctx.wait_for_mail(3).await;
    assert_eq!(sent.len(), 3);
    let mut recipients: Vec<&str> = sent[1..].iter().map(|m| m.to.as_str()).collect();
    recipients.sort_unstable();
    assert_eq!(recipients, ["boss@example.com", "ops@example.com"]);
    for mail in &sent[1..] {
        assert_eq!(mail.subject, "Complaint Status Updated - Wi-Fi down");
        assert!(mail.text.contains("Pending"));
        assert!(mail.text.contains("Resolved"));
    }
}

#[tokio::test]
async fn test_mail_failures_do_not_fail_requests() {
    let ctx = TestContext::with_mailer(test_config(), MemoryMailer::failing()).await;
    ctx.configure_mail().await;
    let admin = ctx.admin_client("boss@example.com").await;

    let created = ctx.submit("Wi-Fi down").await;
    assert_eq!(created["status"], "Pending");

    let url = ctx.url(&format!("/complaints/{}", created["id"].as_str().unwrap()));
    let response = admin
        .patch(&url)
        .json(&json!({ "status": "In Progress" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "In Progress");

    assert!(ctx.settle_mail().await.is_empty());

    let stored: Value = ctx.client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(stored["data"]["status"], "In Progress");
}

#[tokio::test]
async fn test_same_status_sends_nothing() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin_client("boss@example.com").await;
    let created = ctx.submit("Wi-Fi down").await;
    assert!(ctx.settle_mail().await.is_empty());
    ctx.configure_mail().await;

    let url = ctx.url(&format!("/complaints/{}", created["id"].as_str().unwrap()));
    let response = admin
        .patch(&url)
        .json(&json!({ "status": "Pending" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    assert!(ctx.settle_mail().await.is_empty());
}

#[tokio::test]
async fn test_notification_override_address() {
    let ctx = TestContext::new().await;
    ctx.configure_mail().await;
    let admin = ctx.admin_client("boss@example.com").await;

    let prefs: Value = admin
        .put(ctx.url("/user/settings"))
        .json(&json!({ "notificationEmail": "boss-alerts@example.com" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(prefs["data"]["notificationEmail"], "boss-alerts@example.com");
    assert_eq!(prefs["data"]["receiveStatusUpdates"], true);

    ctx.submit("Wi-Fi down").await;
    let sent = ctx.wait_for_mail(2).await;
    let mut recipients: Vec<&str> = sent.iter().map(|m| m.to.as_str()).collect();
    recipients.sort_unstable();
    assert_eq!(recipients, ["boss-alerts@example.com", "ops@example.com"]);
}

// =============================================================================
// System Settings
// =============================================================================

#[tokio::test]
async fn test_settings_require_admin() {
    let ctx = TestContext::new().await;
    assert_eq!(
        client()
            .get(ctx.url("/admin/settings"))
            .send()
            .await
            .unwrap()
            .status(),
        401
    );

    ctx.create_user("guest@example.com", Role::User).await;
    let user = client();
    ctx.login(&user, "guest@example.com", PASSWORD).await;
    assert_eq!(
        user.get(ctx.url("/admin/settings"))
            .send()
            .await
            .unwrap()
            .status(),
        403
    );
}

#[tokio::test]
async fn test_settings_password_is_masked_and_kept() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin_client("boss@example.com").await;

    let saved: Value = admin
        .put(ctx.url("/admin/settings"))
        .json(&json!({
            "smtpHost": "smtp.example.com",
            "smtpPort": 465,
            "smtpUser": "mailer@example.com",
            "smtpPass": "app-password",
            "adminEmail": "ops@example.com",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(saved["data"]["smtpPort"], 465);
    assert_eq!(saved["data"]["isConfigured"], true);
    assert_ne!(saved["data"]["smtpPass"], "app-password");
    assert!(!saved["data"]["lastUpdated"].is_null());

    let masked = saved["data"]["smtpPass"].clone();
    let resaved: Value = admin
        .put(ctx.url("/admin/settings"))
        .json(&json!({ "smtpPass": masked, "systemName": "Front Desk" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resaved["data"]["systemName"], "Front Desk");
    assert_eq!(resaved["data"]["isConfigured"], true);

    let body = admin
        .get(ctx.url("/admin/settings"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(!body.contains("app-password"));
}

#[tokio::test]
async fn test_settings_validation() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin_client("boss@example.com").await;

    let response = admin
        .put(ctx.url("/admin/settings"))
        .json(&json!({ "smtpPort": 70000, "adminEmail": "not-an-email" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["details"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_send_test_email() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin_client("boss@example.com").await;

    let unconfigured = admin
        .post(ctx.url("/admin/settings/test-email"))
        .send()
        .await
        .unwrap();
    assert_eq!(unconfigured.status(), 400);

    ctx.configure_mail().await;

    let default_to: Value = admin
        .post(ctx.url("/admin/settings/test-email"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(default_to["data"]["to"], "ops@example.com");

    let explicit: Value = admin
        .post(ctx.url("/admin/settings/test-email"))
        .json(&json!({ "to": "desk@example.com" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(explicit["data"]["to"], "desk@example.com");

    let sent = ctx.mailer.sent().await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].to, "desk@example.com");
    assert_eq!(sent[1].subject, "Test Email - Compass");
}
