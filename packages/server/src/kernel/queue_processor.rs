//! QueueProcessor: drains the PendingQueue whenever slots might have opened
//! up (spec §4.4).
//!
//! Triggered on admission success that caused queueing, on every
//! terminal/retry-releasing transition, and by a slow once-a-minute
//! safety-net tick. A `tokio::sync::Notify` lets any of those call sites
//! wake the processor without it having to poll.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::kernel::admission::{self, AdmissionDecision};
use crate::kernel::app_context::AppContext;
use crate::kernel::jobs::JobPriority;

const SAFETY_NET_INTERVAL: Duration = Duration::from_secs(60);
const REARM_DELAY: Duration = Duration::from_secs(3);

pub struct QueueProcessor {
    notify: Arc<Notify>,
}

impl QueueProcessor {
    /// Build a processor driven by `notify`. Callers share this same handle
    /// (via [`AppContext::queue_notify`]) so admission and lifecycle code can
    /// wake the processor without holding a reference to it.
    pub fn new(notify: Arc<Notify>) -> Self {
        Self { notify }
    }

    /// Run until the process shuts down, draining on wake-ups and on the
    /// safety-net interval.
    pub async fn run(self, ctx: Arc<AppContext>) {
        loop {
            tokio::select! {
                _ = self.notify.notified() => {},
                _ = tokio::time::sleep(SAFETY_NET_INTERVAL) => {},
            }

            if let Err(e) = drain_until_idle(&ctx, &self.notify).await {
                warn!(error = %e, "queue processor drain failed");
            }
        }
    }
}

/// Drain the queue, re-arming with a short delay as long as entries remain
/// and the previous pass made progress (spec §4.4).
async fn drain_until_idle(ctx: &Arc<AppContext>, notify: &Arc<Notify>) -> Result<()> {
    loop {
        let (processed, remaining) = drain_once(ctx).await?;

        if remaining > 0 && processed > 0 {
            tokio::time::sleep(REARM_DELAY).await;
            continue;
        }

        if remaining > 0 {
            notify.notify_one();
        }
        return Ok(());
    }
}

/// Single drain pass: iterate every campaign with entries waiting (oldest
/// first), popping up to the number of currently available slots from each.
/// `MAX_CONCURRENT` is a global cap (spec §4.4 step 1), so the available
/// count is recomputed between campaigns within the same pass rather than
/// split up front.
async fn drain_once(ctx: &Arc<AppContext>) -> Result<(usize, i64)> {
    let campaigns = ctx.queue.campaigns_with_entries().await?;
    let mut processed = 0usize;

    for campaign_id in campaigns {
        let count = ctx.slots.count().await?;
        let available = ctx.config.max_concurrent_calls.saturating_sub(count);
        if available == 0 {
            break;
        }

        let entries = ctx.queue.pop_front_n(campaign_id.into(), available as i64).await?;

        for entry in entries {
            match admission::can_start(ctx, &entry.phone_number).await? {
                AdmissionDecision::DuplicateInWindow => {
                    debug!(phone_number = %entry.phone_number, "dropping queued entry, duplicate lock held");
                    processed += 1;
                    continue;
                }
                AdmissionDecision::CapacityFull => {
                    ctx.queue
                        .push_back(
                            entry.call_id.into(),
                            entry.campaign_id.into(),
                            entry.phone_number_id.into(),
                            &entry.phone_number,
                            entry.priority,
                        )
                        .await?;
                    continue;
                }
                AdmissionDecision::Ok => {}
            }

            let reserved = admission::start_tracking(ctx, &entry.phone_number, entry.call_id.into()).await?;
            if reserved != AdmissionDecision::Ok {
                ctx.queue
                    .push_back(
                        entry.call_id.into(),
                        entry.campaign_id.into(),
                        entry.phone_number_id.into(),
                        &entry.phone_number,
                        entry.priority,
                    )
                    .await?;
                continue;
            }

            // The call record for `entry.call_id` was already inserted (status
            // INITIATED) by the handler that queued this entry; only the job
            // needs enqueueing now that a slot is free.
            ctx.job_queue
                .enqueue(
                    "initiate_task",
                    serde_json::json!({ "call_id": entry.call_id }),
                    JobPriority::Normal,
                )
                .await?;

            processed += 1;
        }
    }

    let remaining = ctx.queue.total_size().await?;
    Ok((processed, remaining))
}

