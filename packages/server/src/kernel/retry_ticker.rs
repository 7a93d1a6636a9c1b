//! RetryTicker: the once-a-minute pass that moves DISCONNECTED/RNR calls
//! back into the retry path once their window opens and a slot is
//! available, and separately sweeps out calls that exhausted their retry
//! budget (spec §4.5).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::common::CallId;
use crate::kernel::admission::{self, AdmissionDecision};
use crate::kernel::app_context::AppContext;
use crate::kernel::lifecycle;

const TICK_INTERVAL: Duration = Duration::from_secs(60);
const BATCH_SIZE: i64 = 100;
const MAX_CONCURRENT_RETRIES: usize = 50;

/// Run the ticker loop forever. This is the `ticker` subcommand's main
/// loop — the independent scheduler process from the original source
/// (`run_scheduler.py`), now a subcommand of the single orchestrator binary
/// (spec §9 redesign flag).
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    info!("retry ticker starting, interval = 60s");
    loop {
        if let Err(e) = tick(&ctx).await {
            warn!(error = %e, "retry ticker pass failed");
        }
        tokio::time::sleep(TICK_INTERVAL).await;
    }
}

async fn tick(ctx: &Arc<AppContext>) -> Result<()> {
    use crate::domains::calls::CallRecord;

    let due = CallRecord::find_due_for_retry(ctx, BATCH_SIZE).await?;
    let mut retried = 0usize;

    for record in due {
        if retried >= MAX_CONCURRENT_RETRIES {
            break;
        }

        let in_window = ctx.schedule.in_window(chrono::Utc::now(), record.campaign_id).await;
        if !in_window {
            continue;
        }

        let call_id: CallId = record.id.into();
        match admission::can_start(ctx, &record.phone_number).await? {
            AdmissionDecision::Ok => {
                let reserved = admission::start_tracking(ctx, &record.phone_number, call_id).await?;
                if reserved == AdmissionDecision::Ok {
                    lifecycle::retry(ctx, call_id).await?;
                    retried += 1;
                }
            }
            AdmissionDecision::CapacityFull | AdmissionDecision::DuplicateInWindow => {
                let next = ctx
                    .schedule
                    .next_retry(chrono::Utc::now(), record.campaign_id)
                    .await;
                set_next_retry_at(ctx, call_id, next).await?;
            }
        }
    }

    sweep_exhausted(ctx).await?;

    Ok(())
}

async fn set_next_retry_at(
    ctx: &Arc<AppContext>,
    call_id: CallId,
    next_retry_at: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<()> {
    sqlx::query("UPDATE call_records SET next_retry_at = $1, updated_at = NOW() WHERE id = $2")
        .bind(next_retry_at)
        .bind(call_id.into_uuid())
        .execute(&ctx.db_pool)
        .await?;
    Ok(())
}

/// Separately sweep non-terminal records whose `attempt_count` has reached
/// `max_attempts`, marking them FAILED and releasing their slot.
async fn sweep_exhausted(ctx: &Arc<AppContext>) -> Result<()> {
    use crate::domains::calls::CallRecord;

    let exhausted = CallRecord::find_exhausted(ctx).await?;
    for record in exhausted {
        lifecycle::fail_exhausted(ctx, record.id.into()).await?;
    }
    Ok(())
}
