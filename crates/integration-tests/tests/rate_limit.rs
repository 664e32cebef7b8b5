//! Submission rate limiting integration tests.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::time::Duration;

use compass_integration_tests::{TestContext, test_config};
use serde_json::{Value, json};

fn complaint() -> Value {
    json!({
        "title": "Noisy corridor",
        "description": "Loud music after midnight on floor 2",
        "category": "Other",
        "priority": "Low",
    })
}

#[tokio::test]
async fn test_sixth_submission_is_rejected() {
    let ctx = TestContext::new().await;

    for _ in 0..5 {
        ctx.submit("Wi-Fi down").await;
    }

    let response = ctx
        .client
        .post(ctx.url("/complaints"))
        .json(&complaint())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);

    let headers = response.headers();
    let retry_after: u64 = headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=900).contains(&retry_after));
    assert_eq!(headers["x-ratelimit-limit"], "5");
    assert_eq!(headers["x-ratelimit-remaining"], "0");

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "Too many complaints submitted from this IP, please try again later."
    );
}

#[tokio::test]
async fn test_reads_are_not_limited() {
    let mut config = test_config();
    config.rate_limit.max_requests = 1;
    let ctx = TestContext::with_config(config).await;

    ctx.submit("Wi-Fi down").await;
    for _ in 0..5 {
        let response = ctx.client.get(ctx.url("/complaints")).send().await.unwrap();
        assert_eq!(response.status(), 200);
    }
}

#[tokio::test]
async fn test_clients_are_counted_separately() {
    let mut config = test_config();
    config.rate_limit.max_requests = 1;
    let ctx = TestContext::with_config(config).await;

    for ip in ["203.0.113.7", "198.51.100.20"] {
        let response = ctx
            .client
            .post(ctx.url("/complaints"))
            .header("x-forwarded-for", ip)
            .json(&complaint())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201, "first submission from {ip}");
    }

    let again = ctx
        .client
        .post(ctx.url("/complaints"))
        .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
        .json(&complaint())
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 429);
}

#[tokio::test]
async fn test_invalid_submissions_count_against_the_limit() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let ctx = TestContext::with_config(config).await;

    for _ in 0..2 {
        let response = ctx
            .client
            .post(ctx.url("/complaints"))
            .json(&json!({ "title": "" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    let response = ctx
        .client
        .post(ctx.url("/complaints"))
        .json(&complaint())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
}

#[tokio::test]
async fn test_window_expiry_restores_quota() {
    let mut config = test_config();
    config.rate_limit.max_requests = 1;
    config.rate_limit.window = Duration::from_millis(300);
    let ctx = TestContext::with_config(config).await;

    ctx.submit("Wi-Fi down").await;
    let blocked = ctx
        .client
        .post(ctx.url("/complaints"))
        .json(&complaint())
        .send()
        .await
        .unwrap();
    assert_eq!(blocked.status(), 429);

    tokio::time::sleep(Duration::from_millis(400)).await;
    ctx.submit("Wi-Fi down again").await;
}
