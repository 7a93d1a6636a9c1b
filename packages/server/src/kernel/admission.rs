//! Admission: the gate every call passes through before a slot is reserved
//! (spec §4.1). Never raises — callers get a typed outcome and decide what
//! to do (queue it, reject it, proceed).
//!
//! Every reservation is mirrored into a `slot_holdings` row so a crashed
//! worker's slot can be found and reclaimed later (`sweep_stale`), since the
//! Redis counter alone carries no record of which call holds which slot.

use anyhow::Result;
use tracing::warn;
use uuid::Uuid;

use crate::common::CallId;
use crate::kernel::app_context::AppContext;
use crate::kernel::lifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    Ok,
    CapacityFull,
    DuplicateInWindow,
}

/// Check whether `phone_number` could be admitted right now, without
/// reserving anything. Used by the queue processor to decide whether to
/// attempt `start_tracking` for a popped entry.
pub async fn can_start(ctx: &AppContext, phone_number: &str) -> Result<AdmissionDecision> {
    if ctx.slots.has_duplicate_lock(phone_number).await? {
        return Ok(AdmissionDecision::DuplicateInWindow);
    }

    let count = ctx.slots.count().await?;
    if count >= ctx.config.max_concurrent_calls {
        return Ok(AdmissionDecision::CapacityFull);
    }

    Ok(AdmissionDecision::Ok)
}

/// Reserve a slot and the duplicate lock for `phone_number`, recording the
/// holding under `call_id` for later reconciliation. Atomic: either both the
/// Redis reservation and the audit row succeed, or the caller gets a typed
/// rejection and nothing is held.
pub async fn start_tracking(ctx: &AppContext, phone_number: &str, call_id: CallId) -> Result<AdmissionDecision> {
    let reserved = ctx.slots.try_reserve(phone_number).await?;
    if !reserved {
        return can_start(ctx, phone_number).await;
    }

    sqlx::query(
        "INSERT INTO slot_holdings (id, call_id, phone_number, started_at) VALUES ($1, $2, $3, NOW())
         ON CONFLICT (call_id) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(call_id.into_uuid())
    .bind(phone_number)
    .execute(&ctx.db_pool)
    .await?;

    Ok(AdmissionDecision::Ok)
}

/// Release the slot and duplicate lock held for `phone_number`, dropping its
/// audit row. Idempotent: calling this twice for a number that already
/// released is a no-op, gated on the `slot_holdings` row's existence rather
/// than on the duplicate lock (whose own, shorter-lived TTL means it can
/// expire before the call does).
pub async fn end_tracking(ctx: &AppContext, phone_number: &str, call_id: CallId) -> Result<()> {
    let result = sqlx::query("DELETE FROM slot_holdings WHERE call_id = $1")
        .bind(call_id.into_uuid())
        .execute(&ctx.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(());
    }

    ctx.slots.release(phone_number).await?;
    ctx.queue_notify.notify_one();
    Ok(())
}

/// Reclaim slots whose holding has outlived `max_age_minutes` without a
/// callback ever arriving, per the original's `ConcurrencyManager.
/// cleanup_stale_calls`. Releases each stale slot and nudges the
/// corresponding call record back toward retry. Returns the number reclaimed.
pub async fn sweep_stale(ctx: &AppContext, max_age_minutes: i64) -> Result<u64> {
    let stale: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT call_id, phone_number FROM slot_holdings WHERE started_at < NOW() - ($1 || ' minutes')::INTERVAL",
    )
    .bind(max_age_minutes.to_string())
    .fetch_all(&ctx.db_pool)
    .await?;

    let count = stale.len() as u64;
    for (call_id, phone_number) in stale {
        let call_id: CallId = call_id.into();
        end_tracking(ctx, &phone_number, call_id).await?;
        if let Err(e) = lifecycle::reclaim_stale(ctx, call_id).await {
            warn!(error = %e, %call_id, "failed to reclaim stale call record");
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_decision_variants_are_distinct() {
        assert_ne!(AdmissionDecision::Ok, AdmissionDecision::CapacityFull);
        assert_ne!(AdmissionDecision::Ok, AdmissionDecision::DuplicateInWindow);
    }
}
