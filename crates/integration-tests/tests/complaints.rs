//! Complaint API integration tests.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use compass_core::Role;
use compass_integration_tests::{PASSWORD, TestContext, client, test_config};
use serde_json::{Value, json};

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let ctx = TestContext::new().await;

    let live = ctx.client.get(ctx.url("/health")).send().await.unwrap();
    assert_eq!(live.status(), 200);
    assert_eq!(live.headers()["x-content-type-options"], "nosniff");
    assert!(live.headers().contains_key("x-request-id"));
    assert_eq!(live.text().await.unwrap(), "ok");

    let ready = ctx.client.get(ctx.url("/health/ready")).send().await.unwrap();
    assert_eq!(ready.status(), 200);
}

// =============================================================================
// Submission
// =============================================================================

#[tokio::test]
async fn test_submit_round_trip() {
    let ctx = TestContext::new().await;
    let created = ctx.submit("Wi-Fi down").await;

    assert_eq!(created["title"], "Wi-Fi down");
    assert_eq!(created["description"], "No internet for 2 days in room 4");
    assert_eq!(created["category"], "Service");
    assert_eq!(created["priority"], "High");
    assert_eq!(created["status"], "Pending");
    assert_eq!(created["dateSubmitted"], created["lastModified"]);

    let id = created["id"].as_str().unwrap();
    let fetched: Value = ctx
        .client
        .get(ctx.url(&format!("/complaints/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["success"], true);
    assert_eq!(fetched["data"], created);
}

#[tokio::test]
async fn test_admin_submission_is_still_pending() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin_client("boss@example.com").await;

    let response = admin
        .post(ctx.url("/complaints"))
        .json(&json!({
            "title": "Lift broken",
            "description": "East lift stuck on floor 3",
            "category": "Product",
            "priority": "Low",
            "status": "Resolved",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "Pending");
    assert_eq!(body["data"]["submittedBy"]["email"], "boss@example.com");
}

#[tokio::test]
async fn test_submit_validation_errors() {
    let ctx = TestContext::new().await;

    let response = ctx
        .client
        .post(ctx.url("/complaints"))
        .json(&json!({
            "title": "x".repeat(101),
            "description": "<script>steal()</script>",
            "category": "Weather",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["title", "description", "category", "priority"]);

    let list: Value = ctx
        .client
        .get(ctx.url("/complaints"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["data"]["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let ctx = TestContext::new().await;
    let response = ctx
        .client
        .post(ctx.url("/complaints"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn test_list_filters_sorts_and_paginates() {
    let mut config = test_config();
    config.rate_limit.max_requests = 100;
    let ctx = TestContext::with_config(config).await;

    for title in ["Alpha", "Bravo", "Charlie"] {
        ctx.submit(title).await;
    }
    ctx.client
        .post(ctx.url("/complaints"))
        .json(&json!({
            "title": "Delta",
            "description": "Cold shower",
            "category": "Product",
            "priority": "Low",
        }))
        .send()
        .await
        .unwrap();

    let page: Value = ctx
        .client
        .get(ctx.url("/complaints?sortBy=title&sortOrder=asc&limit=2&page=2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let titles: Vec<&str> = page["data"]["complaints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Charlie", "Delta"]);
    assert_eq!(
        page["data"]["pagination"],
        json!({ "page": 2, "limit": 2, "total": 4, "pages": 2 })
    );

    let filtered: Value = ctx
        .client
        .get(ctx.url("/complaints?category=Product&search=SHOWER"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(filtered["data"]["pagination"]["total"], 1);
    assert_eq!(filtered["data"]["complaints"][0]["title"], "Delta");
}

#[tokio::test]
async fn test_list_rejects_unknown_values() {
    let ctx = TestContext::new().await;
    let response = ctx
        .client
        .get(ctx.url("/complaints?status=Closed&sortBy=color"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"status"));
    assert!(fields.contains(&"sortBy"));
}

#[tokio::test]
async fn test_stats() {
    let ctx = TestContext::new().await;
    ctx.submit("Wi-Fi down").await;
    ctx.submit("Wi-Fi down again").await;

    let stats: Value = ctx
        .client
        .get(ctx.url("/complaints/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["data"]["total"], 2);
    assert_eq!(stats["data"]["recentComplaints"], 2);
    assert_eq!(stats["data"]["byStatus"]["Pending"], 2);
    assert_eq!(stats["data"]["byStatus"]["Resolved"], 0);
    assert_eq!(stats["data"]["byCategory"]["Service"], 2);
}

// =============================================================================
// Status Changes and Deletion
// =============================================================================

#[tokio::test]
async fn test_status_update_requires_admin() {
    let ctx = TestContext::new().await;
    let created = ctx.submit("Wi-Fi down").await;
    let url = ctx.url(&format!("/complaints/{}", created["id"].as_str().unwrap()));

    let anonymous = client()
        .patch(&url)
        .json(&json!({ "status": "Resolved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), 401);

    ctx.create_user("guest@example.com", Role::User).await;
    let user = client();
    ctx.login(&user, "guest@example.com", PASSWORD).await;
    let forbidden = user
        .patch(&url)
        .json(&json!({ "status": "Resolved" }))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), 403);

    let current: Value = ctx.client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(current["data"]["status"], "Pending");
}

#[tokio::test]
async fn test_admin_updates_status_with_bearer_token() {
    let ctx = TestContext::new().await;
    ctx.create_user("boss@example.com", Role::Admin).await;
    let token = ctx.login(&client(), "boss@example.com", PASSWORD).await;

    let created = ctx.submit("Wi-Fi down").await;
    let url = ctx.url(&format!("/complaints/{}", created["id"].as_str().unwrap()));

    let response = client()
        .patch(&url)
        .bearer_auth(&token)
        .json(&json!({ "status": "In Progress" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "In Progress");

    let invalid = client()
        .patch(&url)
        .bearer_auth(&token)
        .json(&json!({ "status": "Closed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);
}

#[tokio::test]
async fn test_delete_then_not_found() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin_client("boss@example.com").await;
    let created = ctx.submit("Wi-Fi down").await;
    let id = created["id"].as_str().unwrap();
    let url = ctx.url(&format!("/complaints/{id}"));

    let deleted: Value = admin.delete(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(deleted["data"]["deletedId"], id);

    assert_eq!(ctx.client.get(&url).send().await.unwrap().status(), 404);
    assert_eq!(admin.delete(&url).send().await.unwrap().status(), 404);
    assert_eq!(
        ctx.client
            .get(ctx.url("/complaints/not-a-uuid"))
            .send()
            .await
            .unwrap()
            .status(),
        404
    );
}
