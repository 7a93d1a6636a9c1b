//! `/initiate-call`, `/bulk-initiate-calls`, `/callback`, and `/metrics`
//! handlers (spec §6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::sql::Record;
use crate::common::{phone, AppError, CallId};
use crate::domains::calls::{CallRecord, CallStatus, DailyMetrics};
use crate::domains::campaigns::{Campaign, PhoneNumber};
use crate::kernel::jobs::JobPriority;
use crate::kernel::{admission, lifecycle, AdmissionDecision};
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct InitiateCallRequest {
    pub campaign_id: Uuid,
    pub phone_number: String,
}

pub async fn initiate_call(
    State(state): State<AppState>,
    Json(body): Json<InitiateCallRequest>,
) -> Result<(StatusCode, Json<CallRecord>), AppError> {
    let ctx = &state.ctx;
    let normalized = phone::normalize(&body.phone_number)?;

    Campaign::find_by_id(body.campaign_id, &ctx.db_pool)
        .await
        .map_err(|_| AppError::not_found(format!("campaign {} not found", body.campaign_id)))?;

    let (record, _queued) = place_one(ctx, body.campaign_id, &normalized).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Admit or queue a single call: reserve a slot (inserting the call record
/// and enqueuing `initiate_task` on success) or, on `CapacityFull`, insert
/// the record and push it onto the `PendingQueue` instead. `DuplicateInWindow`
/// is surfaced to the caller as an error rather than silently dropped.
/// The returned `bool` is `true` when the call landed in the `PendingQueue`
/// rather than being dispatched immediately.
async fn place_one(
    ctx: &crate::kernel::AppContext,
    campaign_id: Uuid,
    normalized_number: &str,
) -> Result<(CallRecord, bool), AppError> {
    let number = PhoneNumber::new(campaign_id.into(), normalized_number.to_string());
    let number = number.insert(&ctx.db_pool).await?;

    let record = CallRecord::new(campaign_id, normalized_number.to_string(), ctx.config.max_retry_attempts as i32);
    let call_id: CallId = record.id.into();

    match admission::start_tracking(ctx, normalized_number, call_id).await? {
        AdmissionDecision::DuplicateInWindow => {
            return Err(AppError::too_many_requests(format!(
                "{normalized_number} already has a call in flight"
            )));
        }
        AdmissionDecision::Ok => {
            let record = lifecycle::initiate(ctx, record).await?;
            ctx.job_queue
                .enqueue(
                    "initiate_task",
                    serde_json::json!({ "call_id": record.id }),
                    JobPriority::Normal,
                )
                .await?;
            Ok((record, false))
        }
        AdmissionDecision::CapacityFull => {
            let record = lifecycle::initiate(ctx, record).await?;
            ctx.queue
                .push_back(call_id, campaign_id.into(), number.id.into(), normalized_number, 0)
                .await?;
            Ok((record, true))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkInitiateCallsRequest {
    pub campaign_id: Uuid,
    #[serde(default)]
    pub phone_numbers: Vec<String>,
    #[serde(default)]
    pub use_campaign_numbers: bool,
}

#[derive(Debug, Serialize)]
pub struct QueueInfo {
    pub total_in_queue: i64,
}

#[derive(Debug, Serialize)]
pub struct BulkInitiateCallsResponse {
    pub batch_id: Uuid,
    pub total_requested: usize,
    pub immediate_processed: usize,
    pub queued_for_later: usize,
    pub failed: usize,
    pub call_ids: Vec<Uuid>,
    pub queue_info: QueueInfo,
}

pub async fn bulk_initiate_calls(
    State(state): State<AppState>,
    Json(body): Json<BulkInitiateCallsRequest>,
) -> Result<(StatusCode, Json<BulkInitiateCallsResponse>), AppError> {
    let ctx = &state.ctx;

    Campaign::find_by_id(body.campaign_id, &ctx.db_pool)
        .await
        .map_err(|_| AppError::not_found(format!("campaign {} not found", body.campaign_id)))?;

    let raw_numbers = if body.use_campaign_numbers {
        PhoneNumber::list_for_campaign(ctx, body.campaign_id)
            .await?
            .into_iter()
            .map(|n| n.number)
            .collect()
    } else if !body.phone_numbers.is_empty() {
        body.phone_numbers
    } else {
        return Err(AppError::bad_request(
            "either phone_numbers or use_campaign_numbers must be provided",
        ));
    };

    let total_requested = raw_numbers.len();
    let mut immediate_processed = 0usize;
    let mut queued_for_later = 0usize;
    let mut failed = 0usize;
    let mut call_ids = Vec::with_capacity(total_requested);

    for raw in raw_numbers {
        let normalized = match phone::normalize(&raw) {
            Ok(n) => n,
            Err(_) => {
                failed += 1;
                continue;
            }
        };

        match place_one(ctx, body.campaign_id, &normalized).await {
            Ok((record, queued)) => {
                call_ids.push(record.id);
                if queued {
                    queued_for_later += 1;
                } else {
                    immediate_processed += 1;
                }
            }
            Err(_) => failed += 1,
        }
    }

    let total_in_queue = ctx.queue.size(body.campaign_id.into()).await.unwrap_or(0);

    Ok((
        StatusCode::CREATED,
        Json(BulkInitiateCallsResponse {
            batch_id: Uuid::now_v7(),
            total_requested,
            immediate_processed,
            queued_for_later,
            failed,
            call_ids,
            queue_info: QueueInfo { total_in_queue },
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub call_id: Uuid,
    pub status: String,
    pub call_duration: Option<i32>,
    pub external_call_id: Option<String>,
}

pub async fn callback(
    State(state): State<AppState>,
    Json(body): Json<CallbackRequest>,
) -> Result<StatusCode, AppError> {
    let ctx = &state.ctx;

    let status = CallStatus::from_callback_str(&body.status)
        .ok_or_else(|| AppError::bad_request(format!("unknown callback status: {}", body.status)))?;

    CallRecord::find_by_id(body.call_id, &ctx.db_pool)
        .await
        .map_err(|_| AppError::not_found(format!("call {} not found", body.call_id)))?;

    let call_id: CallId = body.call_id.into();
    lifecycle::apply_callback(ctx, call_id, status, body.external_call_id, body.call_duration)
        .await
        .map_err(|e| AppError::service_unavailable(format!("callback processing failed: {e}"), 5))?;

    Ok(StatusCode::OK)
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub current_concurrent_calls: u32,
    pub max_concurrent_calls: u32,
    pub recent_metrics: Vec<DailyMetrics>,
    pub system_status: String,
}

pub async fn metrics(State(state): State<AppState>) -> Result<Json<MetricsResponse>, AppError> {
    let ctx = &state.ctx;
    let current_concurrent_calls = ctx.slots.count().await?;
    let recent_metrics = DailyMetrics::recent(ctx, 7).await?;

    let system_status = if current_concurrent_calls >= ctx.config.max_concurrent_calls {
        "at_capacity"
    } else {
        "healthy"
    };

    Ok(Json(MetricsResponse {
        current_concurrent_calls,
        max_concurrent_calls: ctx.config.max_concurrent_calls,
        recent_metrics,
        system_status: system_status.to_string(),
    }))
}
