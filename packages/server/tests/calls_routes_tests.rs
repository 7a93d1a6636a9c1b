mod common;

use common::{insert_campaign, unique_phone_number, TestHarness};
use serde_json::json;

#[serial_test::serial]
#[tokio::test]
async fn initiate_call_creates_an_initiated_record() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");
    let campaign = insert_campaign(harness.db_pool(), "Initiate Test").await;

    let (status, body) = harness
        .post(
            "/initiate-call",
            json!({ "campaign_id": campaign.id, "phone_number": unique_phone_number() }),
        )
        .await;

    assert_eq!(status, axum::http::StatusCode::CREATED);
    assert_eq!(body["status"], "INITIATED");
    assert_eq!(body["campaign_id"], campaign.id.to_string());
}

#[serial_test::serial]
#[tokio::test]
async fn initiate_call_404s_for_unknown_campaign() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");

    let (status, _) = harness
        .post(
            "/initiate-call",
            json!({ "campaign_id": uuid::Uuid::new_v4(), "phone_number": unique_phone_number() }),
        )
        .await;

    assert_eq!(status, axum::http::StatusCode::NOT_FOUND);
}

#[serial_test::serial]
#[tokio::test]
async fn initiate_call_rejects_malformed_phone_number() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");
    let campaign = insert_campaign(harness.db_pool(), "Bad Number Test").await;

    let (status, _) = harness
        .post(
            "/initiate-call",
            json!({ "campaign_id": campaign.id, "phone_number": "555-CALL-NOW" }),
        )
        .await;

    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

#[serial_test::serial]
#[tokio::test]
async fn initiate_call_rejects_duplicate_in_window() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");
    let campaign = insert_campaign(harness.db_pool(), "Duplicate Test").await;
    let phone_number = unique_phone_number();

    let (first_status, _) = harness
        .post(
            "/initiate-call",
            json!({ "campaign_id": campaign.id, "phone_number": phone_number }),
        )
        .await;
    assert_eq!(first_status, axum::http::StatusCode::CREATED);

    let (second_status, body) = harness
        .post(
            "/initiate-call",
            json!({ "campaign_id": campaign.id, "phone_number": phone_number }),
        )
        .await;

    assert_eq!(second_status, axum::http::StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "too_many_requests");
}

#[serial_test::serial]
#[tokio::test]
async fn bulk_initiate_calls_requires_numbers_or_campaign_flag() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");
    let campaign = insert_campaign(harness.db_pool(), "Bulk Validation Test").await;

    let (status, _) = harness.post("/bulk-initiate-calls", json!({ "campaign_id": campaign.id })).await;

    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

#[serial_test::serial]
#[tokio::test]
async fn bulk_initiate_calls_queues_beyond_capacity() {
    let harness = TestHarness::new(1).await.expect("harness");
    harness.reset().await.expect("reset");
    let campaign = insert_campaign(harness.db_pool(), "Bulk Capacity Test").await;

    let (status, body) = harness
        .post(
            "/bulk-initiate-calls",
            json!({
                "campaign_id": campaign.id,
                "phone_numbers": [unique_phone_number(), unique_phone_number()]
            }),
        )
        .await;

    assert_eq!(status, axum::http::StatusCode::CREATED);
    assert_eq!(body["total_requested"], 2);
    assert_eq!(body["immediate_processed"], 1);
    assert_eq!(body["queued_for_later"], 1);
    assert_eq!(body["failed"], 0);
    assert_eq!(body["queue_info"]["total_in_queue"], 1);
}

#[serial_test::serial]
#[tokio::test]
async fn bulk_initiate_calls_uses_campaigns_numbers_on_file() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");
    let campaign = insert_campaign(harness.db_pool(), "Campaign Numbers Test").await;

    harness
        .post(
            "/phone-numbers",
            json!({ "campaign_id": campaign.id, "phone_numbers": [unique_phone_number(), unique_phone_number()] }),
        )
        .await;

    let (status, body) = harness
        .post(
            "/bulk-initiate-calls",
            json!({ "campaign_id": campaign.id, "use_campaign_numbers": true }),
        )
        .await;

    assert_eq!(status, axum::http::StatusCode::CREATED);
    assert_eq!(body["total_requested"], 2);
    assert_eq!(body["immediate_processed"], 2);
}

#[serial_test::serial]
#[tokio::test]
async fn callback_rejects_unknown_status() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");
    let campaign = insert_campaign(harness.db_pool(), "Callback Status Test").await;
    let (_, call) = harness
        .post(
            "/initiate-call",
            json!({ "campaign_id": campaign.id, "phone_number": unique_phone_number() }),
        )
        .await;

    let (status, _) = harness
        .put(
            "/callback",
            json!({ "call_id": call["id"], "status": "BUSY" }),
        )
        .await;

    assert_eq!(status, axum::http::StatusCode::BAD_REQUEST);
}

#[serial_test::serial]
#[tokio::test]
async fn callback_404s_for_unknown_call() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");

    let (status, _) = harness
        .put(
            "/callback",
            json!({ "call_id": uuid::Uuid::new_v4(), "status": "PICKED" }),
        )
        .await;

    assert_eq!(status, axum::http::StatusCode::NOT_FOUND);
}

#[serial_test::serial]
#[tokio::test]
async fn callback_picked_completes_the_call_and_records_duration() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");
    let campaign = insert_campaign(harness.db_pool(), "Callback Picked Test").await;
    let (_, call) = harness
        .post(
            "/initiate-call",
            json!({ "campaign_id": campaign.id, "phone_number": unique_phone_number() }),
        )
        .await;

    let (status, _) = harness
        .put(
            "/callback",
            json!({ "call_id": call["id"], "status": "PICKED", "call_duration": 42 }),
        )
        .await;
    assert_eq!(status, axum::http::StatusCode::OK);

    let (_, campaign_after) = harness.get(&format!("/campaigns/{}", campaign.id)).await;
    assert!(campaign_after["id"].is_string());

    let record: (String, Option<i32>) = sqlx::query_as(
        "SELECT status::TEXT, total_call_time_seconds FROM call_records WHERE id = $1",
    )
    .bind(uuid::Uuid::parse_str(call["id"].as_str().unwrap()).unwrap())
    .fetch_one(harness.db_pool())
    .await
    .expect("fetch call record");

    assert_eq!(record.0, "COMPLETED");
    assert_eq!(record.1, Some(42));
}

#[serial_test::serial]
#[tokio::test]
async fn metrics_reports_healthy_below_capacity() {
    let harness = TestHarness::new(10).await.expect("harness");
    harness.reset().await.expect("reset");

    let (status, body) = harness.get("/metrics").await;

    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(body["system_status"], "healthy");
    assert_eq!(body["max_concurrent_calls"], 10);
}
