//! The injected dependency bundle every component takes instead of reaching
//! for a global singleton (spec §9 redesign flag).

use std::sync::Arc;

use provider_client::CallInitiator;
use tokio::sync::Notify;

use crate::config::Config;
use crate::kernel::jobs::JobQueue;
use crate::kernel::pending_queue::PendingQueue;
use crate::kernel::schedule_oracle::ScheduleOracle;
use crate::kernel::slot_registry::SlotRegistry;

/// Everything a component needs to do its job, passed by reference or
/// cloned `Arc`. Constructed once at startup in each subcommand and shared
/// across the axum app, the worker pool, and the ticker.
pub struct AppContext {
    pub db_pool: sqlx::PgPool,
    pub provider: Arc<dyn CallInitiator>,
    pub slots: Arc<SlotRegistry>,
    pub queue: Arc<PendingQueue>,
    pub schedule: Arc<ScheduleOracle>,
    pub job_queue: Arc<dyn JobQueue>,
    pub config: Arc<Config>,
    /// Wakes the [`crate::kernel::queue_processor::QueueProcessor`]. Any code
    /// path that might have freed a slot or queued a new entry calls
    /// `notify_one` on this rather than waiting for the safety-net tick.
    pub queue_notify: Arc<Notify>,
}
