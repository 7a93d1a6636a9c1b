mod common;

use common::TestHarness;
use serde_json::json;

#[serial_test::serial]
#[tokio::test]
async fn create_campaign_returns_201_with_persisted_fields() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");

    let (status, body) = harness
        .post("/campaigns", json!({ "name": "Spring Fundraiser", "description": "q2 push" }))
        .await;

    assert_eq!(status, axum::http::StatusCode::CREATED);
    assert_eq!(body["name"], "Spring Fundraiser");
    assert_eq!(body["description"], "q2 push");
    assert_eq!(body["is_active"], true);
    assert!(body["id"].is_string());
}

#[serial_test::serial]
#[tokio::test]
async fn create_campaign_rejects_empty_name() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");

    let (status, body) = harness.post("/campaigns", json!({ "name": "   " })).await;

    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[serial_test::serial]
#[tokio::test]
async fn get_campaign_returns_404_for_unknown_id() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");

    let (status, _) = harness.get(&format!("/campaigns/{}", uuid::Uuid::new_v4())).await;

    assert_eq!(status, axum::http::StatusCode::NOT_FOUND);
}

#[serial_test::serial]
#[tokio::test]
async fn list_campaigns_includes_newly_created() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");

    let (_, created) = harness.post("/campaigns", json!({ "name": "Winter Drive" })).await;
    let created_id = created["id"].as_str().unwrap().to_string();

    let (status, body) = harness.get("/campaigns").await;

    assert_eq!(status, axum::http::StatusCode::OK);
    let ids: Vec<&str> = body.as_array().unwrap().iter().map(|c| c["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&created_id.as_str()));
}

#[serial_test::serial]
#[tokio::test]
async fn add_phone_numbers_normalizes_and_reports_invalid_entries() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");

    let (_, campaign) = harness.post("/campaigns", json!({ "name": "Outreach" })).await;
    let campaign_id = campaign["id"].as_str().unwrap();

    let (status, body) = harness
        .post(
            "/phone-numbers",
            json!({
                "campaign_id": campaign_id,
                "phone_numbers": ["+1 (555) 100-2000", "not-a-number"]
            }),
        )
        .await;

    assert_eq!(status, axum::http::StatusCode::CREATED);
    assert_eq!(body["created_count"], 1);
    assert_eq!(body["created_numbers"][0], "15551002000");
    assert_eq!(body["errors"].as_array().unwrap().len(), 1);
}

#[serial_test::serial]
#[tokio::test]
async fn add_phone_numbers_404s_for_unknown_campaign() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");

    let (status, _) = harness
        .post(
            "/phone-numbers",
            json!({ "campaign_id": uuid::Uuid::new_v4(), "phone_numbers": ["15551002000"] }),
        )
        .await;

    assert_eq!(status, axum::http::StatusCode::NOT_FOUND);
}

#[serial_test::serial]
#[tokio::test]
async fn requests_without_auth_token_are_rejected() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");

    let request = axum::http::Request::builder()
        .method(axum::http::Method::GET)
        .uri("/campaigns")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = tower::ServiceExt::oneshot(harness.router.clone(), request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
}
