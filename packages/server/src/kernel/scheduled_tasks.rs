//! Scheduled background sweeps using tokio-cron-scheduler.
//!
//! Four independent cron jobs keep the system from leaking state that the
//! request/callback path has no occasion to clean up itself:
//!
//! ```text
//! every hour         -> reload_schedule       (spec §9)
//! every 10 minutes  -> sweep_stale_slots     (spec §4.1, §9)
//! every hour         -> sweep_dead_letters    (spec §4.6)
//! every hour         -> sweep_terminal_calls  (spec §3)
//! ```
//!
//! These run independently of the job queue and the retry ticker; they
//! exist to bound the size of Redis/Postgres state over time, not to drive
//! call lifecycle.

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

use crate::domains::calls::{CallRecord, DeadLetter};
use crate::kernel::admission;
use crate::kernel::app_context::AppContext;

const STALE_SLOT_MAX_AGE_MINUTES: i64 = 60;

/// Start all scheduled sweeps.
pub async fn start_scheduler(ctx: Arc<AppContext>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let schedule_ctx = ctx.clone();
    let reload_job = Job::new_async("0 0 * * * *", move |_uuid, _lock| {
        let ctx = schedule_ctx.clone();
        Box::pin(async move {
            if let Err(e) = ctx.schedule.reload().await {
                warn!(error = %e, "retry schedule reload failed");
            } else {
                info!("retry schedule reloaded");
            }
        })
    })?;
    scheduler.add(reload_job).await?;

    let stale_ctx = ctx.clone();
    let stale_slots_job = Job::new_async("0 */10 * * * *", move |_uuid, _lock| {
        let ctx = stale_ctx.clone();
        Box::pin(async move {
            if let Err(e) = sweep_stale_slots(&ctx).await {
                warn!(error = %e, "stale slot sweep failed");
            }
        })
    })?;
    scheduler.add(stale_slots_job).await?;

    let dlq_ctx = ctx.clone();
    let dead_letters_job = Job::new_async("0 0 * * * *", move |_uuid, _lock| {
        let ctx = dlq_ctx.clone();
        Box::pin(async move {
            if let Err(e) = sweep_dead_letters(&ctx).await {
                warn!(error = %e, "dead letter retention sweep failed");
            }
        })
    })?;
    scheduler.add(dead_letters_job).await?;

    let terminal_ctx = ctx.clone();
    let terminal_calls_job = Job::new_async("0 0 * * * *", move |_uuid, _lock| {
        let ctx = terminal_ctx.clone();
        Box::pin(async move {
            if let Err(e) = sweep_terminal_calls(&ctx).await {
                warn!(error = %e, "terminal call cleanup sweep failed");
            }
        })
    })?;
    scheduler.add(terminal_calls_job).await?;

    scheduler.start().await?;

    info!("scheduled sweeps started (stale slots every 10m, dead letters and terminal calls hourly)");
    Ok(scheduler)
}

/// Release slots whose holding outlived the staleness window with no
/// callback ever arriving, and nudge the owning call back toward retry.
async fn sweep_stale_slots(ctx: &AppContext) -> Result<()> {
    let reclaimed = admission::sweep_stale(ctx, STALE_SLOT_MAX_AGE_MINUTES).await?;
    if reclaimed > 0 {
        info!(reclaimed, "reclaimed stale call slots");
    }
    Ok(())
}

/// Purge dead letters past `dlq_retention_days`.
async fn sweep_dead_letters(ctx: &AppContext) -> Result<()> {
    let deleted = DeadLetter::delete_older_than(ctx, ctx.config.dlq_retention_days).await?;
    if deleted > 0 {
        info!(deleted, "purged expired dead letters");
    }
    Ok(())
}

/// Purge terminal call records older than the fixed 30-day retention window
/// (spec §3).
async fn sweep_terminal_calls(ctx: &AppContext) -> Result<()> {
    const TERMINAL_RETENTION_DAYS: i64 = 30;
    let deleted = CallRecord::delete_terminal_older_than(ctx, TERMINAL_RETENTION_DAYS).await?;
    if deleted > 0 {
        info!(deleted, "purged expired terminal call records");
    }
    Ok(())
}
