//! Maps job type strings (`initiate_task`, `callback_task`,
//! `external_callback_delivery`) to the handler that executes them.
//!
//! This lets [`super::runner::JobRunner`] claim jobs from the database and
//! dispatch them to domain handlers without knowing the concrete payload
//! type of each job.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;

use super::queue::ClaimedJob;
use crate::kernel::app_context::AppContext;

type BoxedHandler = Box<
    dyn Fn(serde_json::Value, Arc<AppContext>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
>;

/// Registry that maps job type strings to handlers.
///
/// # Example
///
/// ```ignore
/// let mut registry = JobRegistry::new();
/// registry.register::<InitiateTaskArgs, _, _>("initiate_task", |args, ctx| async move {
///     kernel::lifecycle::initiate(args.call_id, &ctx).await
/// });
/// ```
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, BoxedHandler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<J, F, Fut>(&mut self, job_type: &'static str, handler: F)
    where
        J: DeserializeOwned + Send + Sync + 'static,
        F: Fn(J, Arc<AppContext>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |value, ctx| {
            let handler = handler.clone();
            Box::pin(async move {
                let args: J = serde_json::from_value(value)
                    .map_err(|e| anyhow!("failed to deserialize {job_type}: {e}"))?;
                handler(args, ctx).await
            })
        });

        self.handlers.insert(job_type, boxed);
    }

    pub async fn execute(&self, job: &ClaimedJob, ctx: Arc<AppContext>) -> Result<()> {
        let job_type = job.job_type();
        let handler = self
            .handlers
            .get(job_type)
            .ok_or_else(|| anyhow!("unknown job type: {job_type}"))?;

        let args = job
            .job
            .args
            .clone()
            .ok_or_else(|| anyhow!("job {} has no args", job.id))?;

        handler(args, ctx).await
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}

pub type SharedJobRegistry = Arc<JobRegistry>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TestArgs {
        pub call_id: Uuid,
    }

    #[test]
    fn test_register_and_check() {
        let mut registry = JobRegistry::new();
        registry.register::<TestArgs, _, _>("test_job", |_args, _ctx| async move { Ok(()) });

        assert!(registry.is_registered("test_job"));
        assert!(!registry.is_registered("unknown_job"));
    }

    #[test]
    fn test_registered_types() {
        let mut registry = JobRegistry::new();
        registry.register::<TestArgs, _, _>("test_job", |_args, _ctx| async move { Ok(()) });

        assert!(registry.registered_types().contains(&"test_job"));
    }
}
