//! The TaskBus: at-least-once background job execution.
//!
//! - [`Job`] — the row model, claimed via `FOR UPDATE SKIP LOCKED`.
//! - [`JobQueue`]/[`PostgresJobQueue`] — enqueue, claim, retry/dead-letter.
//! - [`JobRegistry`] — maps `job_type` to its handler.
//! - [`JobRunner`] — polls the queue and drives the registry.

mod handlers;
mod job;
mod queue;
mod registry;
mod runner;

pub use handlers::registry_with_handlers;
pub use job::{ErrorKind, Job, JobPriority, JobStatus};
pub use queue::{ClaimedJob, JobQueue, PostgresJobQueue};
pub use registry::{JobRegistry, SharedJobRegistry};
pub use runner::{JobRunner, JobRunnerConfig};
