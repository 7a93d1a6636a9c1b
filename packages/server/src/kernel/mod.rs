// Kernel - core infrastructure with dependency injection
//
// AppContext holds all server dependencies (database, Redis, provider
// client, job queue) and is passed explicitly to every domain function.
//
// IMPORTANT: Kernel is for INFRASTRUCTURE only, not business logic.
// Business logic belongs in domain layers.

pub mod admission;
pub mod app_context;
pub mod jobs;
pub mod lifecycle;
pub mod pending_queue;
pub mod queue_processor;
pub mod retry_ticker;
pub mod schedule_oracle;
pub mod scheduled_tasks;
pub mod slot_registry;

pub use admission::AdmissionDecision;
pub use app_context::AppContext;
pub use pending_queue::{PendingQueue, QueueEntry};
pub use queue_processor::QueueProcessor;
pub use schedule_oracle::ScheduleOracle;
pub use slot_registry::SlotRegistry;
