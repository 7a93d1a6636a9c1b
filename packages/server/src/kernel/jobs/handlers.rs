//! The one real TaskBus handler this service dispatches: `initiate_task`,
//! the call that actually reaches the provider (spec §4.2, §4.6).
//!
//! `callback_task` and `external_callback_delivery` appear in spec §4.6's
//! TaskBus task table and size the retry-policy helpers in
//! [`super::queue`], but the callback path itself is synchronous here
//! (`PUT /callback` returns the outcome of [`crate::kernel::lifecycle::
//! apply_callback`] directly, per spec §6's HTTP table) rather than being
//! queued — grounded in the original's `process_external_callback`, whose
//! only job was forwarding to that same internal API. No job type needs a
//! handler here beyond `initiate_task`.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::registry::JobRegistry;
use crate::common::CallId;
use crate::domains::calls::CallRecord;
use crate::domains::campaigns::Campaign;
use crate::kernel::app_context::AppContext;
use crate::kernel::lifecycle;
use provider_client::InitiateCallRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateTaskArgs {
    pub call_id: Uuid,
}

/// Build the registry this service runs: just `initiate_task`.
pub fn registry_with_handlers() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register::<InitiateTaskArgs, _, _>("initiate_task", handle_initiate_task);
    registry
}

async fn handle_initiate_task(args: InitiateTaskArgs, ctx: Arc<AppContext>) -> Result<()> {
    let call_id: CallId = args.call_id.into();
    let record = CallRecord::find_by_id(args.call_id, &ctx.db_pool).await?;

    if record.status.is_terminal() {
        return Ok(());
    }

    lifecycle::mark_processing(&ctx, call_id).await?;

    let campaign = Campaign::find_by_id(record.campaign_id, &ctx.db_pool).await?;

    let request = InitiateCallRequest {
        call_id: args.call_id,
        phone_number: record.phone_number.clone(),
        campaign_id: record.campaign_id,
        campaign_name: campaign.name,
    };

    match ctx.provider.initiate_call(request).await {
        Ok(response) => {
            lifecycle::record_external_call_id(&ctx, call_id, response.external_call_id).await?;
            Ok(())
        }
        Err(e) => {
            // A provider rejection is a business outcome, not a task
            // execution error: go straight to FAILED rather than letting the
            // TaskBus retry the same HTTP call (see module docs).
            lifecycle::fail_initiation(&ctx, call_id, &e.to_string()).await?;
            Ok(())
        }
    }
}
