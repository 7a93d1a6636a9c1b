//! PostgreSQL-backed job queue: the TaskBus implementation.
//!
//! At-least-once delivery with per-job-type retry policy. Exhausted jobs are
//! written to the `dead_letters` table under the topic named in spec §4.6
//! (`call_initiation` for `initiate_task`, `callback` for `callback_task`)
//! rather than silently dropped.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::job::{ErrorKind, Job, JobPriority};
use crate::common::sql::Record;

/// A claimed job ready for execution.
#[derive(Debug)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job: Job,
}

impl ClaimedJob {
    pub fn deserialize<C: serde::de::DeserializeOwned>(&self) -> Result<C> {
        let args = self
            .job
            .args
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("job {} has no args", self.id))?;
        serde_json::from_value(args.clone())
            .map_err(|e| anyhow::anyhow!("failed to deserialize job payload: {e}"))
    }

    pub fn job_type(&self) -> &str {
        &self.job.job_type
    }
}

/// Base retry delay for a job type, per spec §4.6: 3 retries base 60s for
/// `initiate_task`/`callback_task`, 3 retries base 5s for
/// `external_callback_delivery`.
fn base_retry_secs(job_type: &str) -> i64 {
    match job_type {
        "external_callback_delivery" => 5,
        _ => 60,
    }
}

/// Dead-letter topic for a job type.
fn dead_letter_topic(job_type: &str) -> &str {
    match job_type {
        "initiate_task" => "call_initiation",
        "callback_task" => "callback",
        other => other,
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job for immediate execution.
    async fn enqueue(
        &self,
        job_type: &str,
        args: serde_json::Value,
        priority: JobPriority,
    ) -> Result<Uuid>;

    /// Schedule a job for future execution.
    async fn schedule(
        &self,
        job_type: &str,
        args: serde_json::Value,
        run_at: DateTime<Utc>,
        priority: JobPriority,
    ) -> Result<Uuid>;

    /// Claim up to `limit` jobs for processing via `FOR UPDATE SKIP LOCKED`.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>>;

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job as failed. Retries (exponential backoff from the job
    /// type's base delay) if `kind` is retryable and attempts remain;
    /// otherwise writes a dead-letter row and marks the job dead-lettered.
    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()>;

    async fn cancel(&self, job_id: Uuid) -> Result<bool>;

    async fn heartbeat(&self, job_id: Uuid) -> Result<()>;
}

/// Owns only a bare pool, not the full `AppContext` — the job queue is
/// itself a dependency of `AppContext`, so depending back on it would be
/// circular.
pub struct PostgresJobQueue {
    pool: PgPool,
    default_lease_ms: i64,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            default_lease_ms: 60_000,
        }
    }

    pub fn with_lease_duration(pool: PgPool, lease_ms: i64) -> Self {
        Self {
            pool,
            default_lease_ms: lease_ms,
        }
    }

    async fn write_dead_letter(&self, job: &Job, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO dead_letters (id, topic, payload, error, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(dead_letter_topic(&job.job_type))
        .bind(job.args.clone().unwrap_or(serde_json::Value::Null))
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        args: serde_json::Value,
        priority: JobPriority,
    ) -> Result<Uuid> {
        let job = Job::builder()
            .job_type(job_type.to_string())
            .args(args)
            .priority(priority)
            .lease_duration_ms(self.default_lease_ms)
            .build();
        let inserted = job.insert(&self.pool).await?;
        Ok(inserted.id)
    }

    async fn schedule(
        &self,
        job_type: &str,
        args: serde_json::Value,
        run_at: DateTime<Utc>,
        priority: JobPriority,
    ) -> Result<Uuid> {
        let job = Job::builder()
            .job_type(job_type.to_string())
            .args(args)
            .next_run_at(run_at)
            .priority(priority)
            .lease_duration_ms(self.default_lease_ms)
            .build();
        let inserted = job.insert(&self.pool).await?;
        Ok(inserted.id)
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>> {
        let jobs = Job::claim_jobs(limit, worker_id, self.default_lease_ms, &self.pool).await?;
        Ok(jobs
            .into_iter()
            .map(|job| ClaimedJob { id: job.id, job })
            .collect())
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'succeeded', updated_at = NOW() WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()> {
        let job = Job::find_by_id(job_id, &self.pool).await?;

        if kind.should_retry() && job.retry_count < job.max_retries {
            let delay_secs =
                (base_retry_secs(&job.job_type) * 2i64.pow(job.retry_count as u32)).min(3600);
            let retry_at = Utc::now() + chrono::Duration::seconds(delay_secs);

            let retry_job = job.create_retry(retry_at);
            retry_job.insert(&self.pool).await?;

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed', error_message = $1, error_kind = $2, updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        } else {
            self.write_dead_letter(&job, error).await?;

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'dead_letter', error_message = $1, error_kind = $2,
                    dead_lettered_at = NOW(), dead_letter_reason = 'max retries exceeded',
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn cancel(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET status = 'cancelled', error_kind = 'cancelled', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn heartbeat(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL, updated_at = NOW()
            WHERE id = $2 AND status = 'running'
            "#,
        )
        .bind(self.default_lease_ms.to_string())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_retry_secs_is_5_for_callback_delivery() {
        assert_eq!(base_retry_secs("external_callback_delivery"), 5);
    }

    #[test]
    fn base_retry_secs_is_60_for_task_jobs() {
        assert_eq!(base_retry_secs("initiate_task"), 60);
        assert_eq!(base_retry_secs("callback_task"), 60);
    }

    #[test]
    fn dead_letter_topic_maps_initiate_and_callback() {
        assert_eq!(dead_letter_topic("initiate_task"), "call_initiation");
        assert_eq!(dead_letter_topic("callback_task"), "callback");
        assert_eq!(dead_letter_topic("external_callback_delivery"), "external_callback_delivery");
    }
}
