//! Background service that polls the `JobQueue`, executes jobs via the
//! `JobRegistry`, and reports success/failure back to the queue.
//!
//! This is what the `worker` subcommand of the `orchestrator` binary runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::queue::JobQueue;
use super::registry::SharedJobRegistry;
use super::ErrorKind;
use crate::kernel::app_context::AppContext;

#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub worker_id: String,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            worker_id: format!("runner-{}", Uuid::new_v4()),
        }
    }
}

impl JobRunnerConfig {
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

pub struct JobRunner {
    job_queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    ctx: Arc<AppContext>,
    config: JobRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(job_queue: Arc<dyn JobQueue>, registry: SharedJobRegistry, ctx: Arc<AppContext>) -> Self {
        Self {
            job_queue,
            registry,
            ctx,
            config: JobRunnerConfig::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_config(
        job_queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        ctx: Arc<AppContext>,
        config: JobRunnerConfig,
    ) -> Self {
        Self {
            job_queue,
            registry,
            ctx,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "job runner starting"
        );

        loop {
            if self.is_shutdown_requested() {
                break;
            }

            let jobs = match self
                .job_queue
                .claim(&self.config.worker_id, self.config.batch_size)
                .await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            debug!(count = jobs.len(), "claimed jobs");

            for job in jobs {
                if self.is_shutdown_requested() {
                    break;
                }

                let job_id = job.id;
                let job_type = job.job_type().to_string();

                debug!(job_id = %job_id, job_type = %job_type, "executing job");

                let result = self.registry.execute(&job, self.ctx.clone()).await;

                match result {
                    Ok(()) => {
                        info!(job_id = %job_id, job_type = %job_type, "job succeeded");
                        if let Err(e) = self.job_queue.mark_succeeded(job_id).await {
                            error!(job_id = %job_id, error = %e, "failed to mark job as succeeded");
                        }
                    }
                    Err(e) => {
                        warn!(job_id = %job_id, job_type = %job_type, error = %e, "job failed");

                        let error_kind = classify_error(&e);

                        if let Err(mark_err) = self
                            .job_queue
                            .mark_failed(job_id, &e.to_string(), error_kind)
                            .await
                        {
                            error!(job_id = %job_id, error = %mark_err, "failed to mark job as failed");
                        }
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "job runner stopped");
        Ok(())
    }

    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = self.shutdown_handle();

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        });

        self.run().await
    }
}

/// Classify an error to determine retry behavior. Providers that return
/// 5xx/network errors are retryable; validation and provider 4xx failures
/// are not (spec §7).
fn classify_error(error: &anyhow::Error) -> ErrorKind {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("not found")
        || error_str.contains("invalid")
        || error_str.contains("permission denied")
        || error_str.contains("unauthorized")
        || error_str.contains("forbidden")
    {
        return ErrorKind::NonRetryable;
    }

    if error_str.contains("deserialize") || error_str.contains("parse") {
        return ErrorKind::NonRetryable;
    }

    ErrorKind::Retryable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = JobRunnerConfig::default();
        assert_eq!(config.batch_size, 10);
        assert!(config.worker_id.starts_with("runner-"));
    }

    #[test]
    fn test_config_with_worker_id() {
        let config = JobRunnerConfig::with_worker_id("my-runner");
        assert_eq!(config.worker_id, "my-runner");
    }

    #[test]
    fn test_classify_error_retryable() {
        let error = anyhow::anyhow!("connection timeout");
        assert_eq!(classify_error(&error), ErrorKind::Retryable);
    }

    #[test]
    fn test_classify_error_not_found() {
        let error = anyhow::anyhow!("call not found");
        assert_eq!(classify_error(&error), ErrorKind::NonRetryable);
    }

    #[test]
    fn test_classify_error_deserialize() {
        let error = anyhow::anyhow!("failed to deserialize payload");
        assert_eq!(classify_error(&error), ErrorKind::NonRetryable);
    }
}
