//! The CallRecord state machine (spec §4.2).
//!
//! `INITIATED → PROCESSING → {PICKED → COMPLETED, DISCONNECTED/RNR →
//! retry-or-FAILED} → RETRYING → PROCESSING`. Every transition is performed
//! inside a `SELECT ... FOR UPDATE` transaction so concurrent callbacks and
//! ticker sweeps for the same call never race, and every transition writes
//! today's `daily_metrics` row in the same transaction (spec.md Section C).

use anyhow::{anyhow, Result};

use crate::common::CallId;
use crate::domains::calls::{CallRecord, CallStatus, DailyMetrics};
use crate::kernel::admission;
use crate::kernel::app_context::AppContext;
use crate::kernel::jobs::JobPriority;

/// Mark a call INITIATED → PROCESSING once the `initiate_task` job has
/// actually placed the call with the provider.
pub async fn mark_processing(ctx: &AppContext, call_id: CallId) -> Result<()> {
    let mut tx = ctx.db_pool.begin().await?;
    let mut record = CallRecord::find_for_update(&mut tx, call_id.into_uuid()).await?;

    if record.status.is_terminal() {
        tx.commit().await?;
        return Ok(());
    }

    record.status = CallStatus::Processing;
    update_in_tx(&mut tx, &record).await?;
    tx.commit().await?;
    Ok(())
}

/// Persist the provider's `external_call_id` once `initiate_task` gets a 2xx
/// back. The call stays PROCESSING, awaiting the provider's callback.
pub async fn record_external_call_id(
    ctx: &AppContext,
    call_id: CallId,
    external_call_id: String,
) -> Result<()> {
    let mut tx = ctx.db_pool.begin().await?;
    let mut record = CallRecord::find_for_update(&mut tx, call_id.into_uuid()).await?;

    if record.status.is_terminal() {
        tx.commit().await?;
        return Ok(());
    }

    record.external_call_id = Some(external_call_id);
    update_in_tx(&mut tx, &record).await?;
    tx.commit().await?;
    Ok(())
}

/// A definitive provider rejection of `initiate_task` (non-2xx or network
/// error): FAILED, slot released, DeadLetter written under the
/// `call_initiation` topic (spec §4.2, §4.6). Grounded in the original's
/// `process_call_initiation`, which goes straight to FAILED on a failed
/// provider call rather than retrying it at the task layer.
pub async fn fail_initiation(ctx: &AppContext, call_id: CallId, reason: &str) -> Result<()> {
    let mut tx = ctx.db_pool.begin().await?;
    let mut record = CallRecord::find_for_update(&mut tx, call_id.into_uuid()).await?;

    if record.status.is_terminal() {
        tx.commit().await?;
        return Ok(());
    }

    record.status = CallStatus::Failed;
    record.error_message = Some(reason.to_string());

    let concurrent = ctx.slots.count().await.unwrap_or(0) as i32;
    DailyMetrics::record_transition(&mut tx, record.status, concurrent).await?;
    update_in_tx(&mut tx, &record).await?;

    sqlx::query(
        "INSERT INTO dead_letters (id, topic, payload, error, created_at) VALUES ($1, $2, $3, $4, NOW())",
    )
    .bind(uuid::Uuid::now_v7())
    .bind("call_initiation")
    .bind(serde_json::json!({ "call_id": record.id, "phone_number": record.phone_number, "campaign_id": record.campaign_id }))
    .bind(reason)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    admission::end_tracking(ctx, &record.phone_number, call_id).await?;
    Ok(())
}

/// Insert a freshly-created call record and record the INITIATED event in
/// the same transaction (spec.md Section C: every transition, including
/// creation, writes `daily_metrics`).
pub async fn initiate(ctx: &AppContext, record: CallRecord) -> Result<CallRecord> {
    let mut tx = ctx.db_pool.begin().await?;

    let inserted = sqlx::query_as::<_, CallRecord>(
        r#"
        INSERT INTO call_records (
            id, campaign_id, phone_number, status, attempt_count, max_attempts, last_attempt_at,
            next_retry_at, external_call_id, error_message, total_call_time_seconds,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING id, campaign_id, phone_number, status, attempt_count, max_attempts, last_attempt_at,
                  next_retry_at, external_call_id, error_message, total_call_time_seconds,
                  created_at, updated_at
        "#,
    )
    .bind(record.id)
    .bind(record.campaign_id)
    .bind(&record.phone_number)
    .bind(record.status)
    .bind(record.attempt_count)
    .bind(record.max_attempts)
    .bind(record.last_attempt_at)
    .bind(record.next_retry_at)
    .bind(&record.external_call_id)
    .bind(&record.error_message)
    .bind(record.total_call_time_seconds)
    .bind(record.created_at)
    .bind(record.updated_at)
    .fetch_one(&mut *tx)
    .await?;

    let concurrent = ctx.slots.count().await.unwrap_or(0) as i32;
    DailyMetrics::record_transition(&mut tx, CallStatus::Initiated, concurrent).await?;
    tx.commit().await?;

    Ok(inserted)
}

/// Apply a provider callback. Late callbacks on an already-terminal call are
/// accepted idempotently: only `external_call_id` is last-write-wins
/// updated, the status is left alone.
pub async fn apply_callback(
    ctx: &AppContext,
    call_id: CallId,
    status: CallStatus,
    external_call_id: Option<String>,
    call_duration: Option<i32>,
) -> Result<()> {
    if matches!(status, CallStatus::Initiated | CallStatus::Processing | CallStatus::Retrying) {
        return Err(anyhow!("callback cannot set status to {status:?} directly"));
    }

    let mut tx = ctx.db_pool.begin().await?;
    let mut record = CallRecord::find_for_update(&mut tx, call_id.into_uuid()).await?;

    if record.status.is_terminal() {
        if external_call_id.is_some() {
            record.external_call_id = external_call_id;
            update_in_tx(&mut tx, &record).await?;
        }
        tx.commit().await?;
        return Ok(());
    }

    if let Some(id) = external_call_id {
        record.external_call_id = Some(id);
    }

    // The metric records the callback event itself, not whatever terminal
    // status the record ends up at (a PICKED callback still completes the
    // call, but it's the PICKED event that daily_metrics counts).
    let event_status = status;

    match status {
        CallStatus::Picked => {
            record.status = CallStatus::Completed;
            record.total_call_time_seconds = call_duration;
        }
        CallStatus::Disconnected | CallStatus::Rnr => {
            if record.attempt_count >= record.max_attempts {
                record.status = CallStatus::Failed;
            } else {
                record.status = status;
                record.next_retry_at = ctx
                    .schedule
                    .next_retry(chrono::Utc::now(), record.campaign_id)
                    .await;
            }
        }
        CallStatus::Failed => {
            record.status = CallStatus::Failed;
        }
        CallStatus::Initiated | CallStatus::Processing | CallStatus::Retrying | CallStatus::Completed => {
            unreachable!("rejected above")
        }
    }

    let concurrent = ctx.slots.count().await.unwrap_or(0) as i32;
    DailyMetrics::record_transition(&mut tx, event_status, concurrent).await?;
    update_in_tx(&mut tx, &record).await?;
    tx.commit().await?;

    // Whatever the outcome, the provider's session for this call has ended:
    // release the slot now rather than holding it until a later retry.
    admission::end_tracking(ctx, &record.phone_number, call_id).await?;

    Ok(())
}

/// Transition a DISCONNECTED/RNR call back into the retry path: RETRYING,
/// with a fresh `initiate_task` enqueued. Called by the RetryTicker once a
/// record's window has opened and admission allows it (spec §4.5).
pub async fn retry(ctx: &AppContext, call_id: CallId) -> Result<()> {
    let mut tx = ctx.db_pool.begin().await?;
    let mut record = CallRecord::find_for_update(&mut tx, call_id.into_uuid()).await?;

    if record.status.is_terminal() {
        tx.commit().await?;
        return Ok(());
    }

    record.status = CallStatus::Retrying;
    record.next_retry_at = None;
    record.attempt_count += 1;
    record.last_attempt_at = chrono::Utc::now();

    let concurrent = ctx.slots.count().await.unwrap_or(0) as i32;
    DailyMetrics::record_transition(&mut tx, CallStatus::Retrying, concurrent).await?;
    update_in_tx(&mut tx, &record).await?;
    tx.commit().await?;

    ctx.job_queue
        .enqueue(
            "initiate_task",
            serde_json::json!({ "call_id": call_id.into_uuid() }),
            JobPriority::Normal,
        )
        .await?;

    Ok(())
}

/// Mark a non-terminal call FAILED because it exhausted its retry budget,
/// releasing its slot (spec §4.5 exhaustion sweep).
pub async fn fail_exhausted(ctx: &AppContext, call_id: CallId) -> Result<()> {
    let mut tx = ctx.db_pool.begin().await?;
    let mut record = CallRecord::find_for_update(&mut tx, call_id.into_uuid()).await?;

    if record.status.is_terminal() {
        tx.commit().await?;
        return Ok(());
    }

    record.status = CallStatus::Failed;
    let concurrent = ctx.slots.count().await.unwrap_or(0) as i32;
    DailyMetrics::record_transition(&mut tx, record.status, concurrent).await?;
    update_in_tx(&mut tx, &record).await?;
    tx.commit().await?;

    admission::end_tracking(ctx, &record.phone_number, call_id).await?;
    Ok(())
}

/// Nudge a call stuck in PROCESSING back toward retry after its slot holding
/// outlived the staleness window with no callback ever arriving. The caller
/// (`admission::sweep_stale`) has already released the slot; this only
/// updates the call record itself.
pub async fn reclaim_stale(ctx: &AppContext, call_id: CallId) -> Result<()> {
    let mut tx = ctx.db_pool.begin().await?;
    let mut record = CallRecord::find_for_update(&mut tx, call_id.into_uuid()).await?;

    if record.status.is_terminal() || record.status != CallStatus::Processing {
        tx.commit().await?;
        return Ok(());
    }

    record.error_message = Some("stale: no callback received within slot timeout".to_string());
    if record.attempt_count >= record.max_attempts {
        record.status = CallStatus::Failed;
    } else {
        record.status = CallStatus::Disconnected;
        record.next_retry_at = ctx
            .schedule
            .next_retry(chrono::Utc::now(), record.campaign_id)
            .await;
    }

    let concurrent = ctx.slots.count().await.unwrap_or(0) as i32;
    DailyMetrics::record_transition(&mut tx, record.status, concurrent).await?;
    update_in_tx(&mut tx, &record).await?;
    tx.commit().await?;

    Ok(())
}

async fn update_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    record: &CallRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE call_records SET
            status = $1, attempt_count = $2, last_attempt_at = $3, next_retry_at = $4,
            external_call_id = $5, error_message = $6, total_call_time_seconds = $7, updated_at = NOW()
        WHERE id = $8
        "#,
    )
    .bind(record.status)
    .bind(record.attempt_count)
    .bind(record.last_attempt_at)
    .bind(record.next_retry_at)
    .bind(&record.external_call_id)
    .bind(&record.error_message)
    .bind(record.total_call_time_seconds)
    .bind(record.id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

