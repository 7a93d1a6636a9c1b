//! Job model for background task execution (the TaskBus).

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::sql::Record;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    DeadLetter,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_priority", rename_all = "snake_case")]
pub enum JobPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    /// Convert to integer for efficient DB ordering (lower = higher priority).
    pub fn as_i16(&self) -> i16 {
        match self {
            JobPriority::Critical => 0,
            JobPriority::High => 1,
            JobPriority::Normal => 2,
            JobPriority::Low => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "error_kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient error, will retry if attempts remain.
    #[default]
    Retryable,
    /// Permanent error, will not retry.
    NonRetryable,
    /// Job was cancelled.
    Cancelled,
    /// Job was interrupted by graceful shutdown, will retry.
    Shutdown,
}

impl ErrorKind {
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable | ErrorKind::Shutdown)
    }
}

// ============================================================================
// Job model
// ============================================================================

/// A single unit of at-least-once background work: `initiate_task`,
/// `callback_task`, or `external_callback_delivery`. `job_type` selects the
/// handler via the [`crate::kernel::jobs::registry::JobRegistry`]; `args`
/// carries the handler's payload (e.g. `call_id`).
#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,

    pub job_type: String,

    #[builder(default, setter(strip_option))]
    pub next_run_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub last_run_at: Option<DateTime<Utc>>,

    #[builder(default, setter(strip_option))]
    pub args: Option<serde_json::Value>,

    #[builder(default)]
    pub priority: JobPriority,

    #[builder(default = 3)]
    pub max_retries: i32,
    #[builder(default = 0)]
    pub retry_count: i32,
    #[builder(default = 1)]
    pub attempt: i32,

    #[builder(default = 300_000)]
    pub timeout_ms: i64,
    #[builder(default = 60_000)]
    pub lease_duration_ms: i64,

    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,

    #[builder(default)]
    pub status: JobStatus,
    #[builder(default = true)]
    pub enabled: bool,

    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_kind: Option<ErrorKind>,

    #[builder(default, setter(strip_option))]
    pub dead_lettered_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub dead_letter_reason: Option<String>,

    #[builder(default, setter(strip_option))]
    pub root_job_id: Option<Uuid>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create an immediate one-time job.
    pub fn immediate(job_type: &str, args: serde_json::Value) -> Self {
        Self::builder().job_type(job_type.to_string()).args(args).build()
    }

    /// Create a job scheduled for a specific time (used by retry enqueueing).
    pub fn scheduled(job_type: &str, args: serde_json::Value, run_at: DateTime<Utc>) -> Self {
        Self::builder()
            .job_type(job_type.to_string())
            .args(args)
            .next_run_at(run_at)
            .build()
    }

    pub fn is_ready(&self) -> bool {
        if self.status != JobStatus::Pending || !self.enabled {
            return false;
        }
        if self.retry_count >= self.max_retries {
            return false;
        }
        match self.next_run_at {
            None => true,
            Some(next_run) => next_run <= Utc::now(),
        }
    }

    /// Claim up to `limit` ready jobs atomically, recovering jobs whose lease
    /// has expired without a worker reporting back.
    pub async fn claim_jobs(
        limit: i64,
        worker_id: &str,
        lease_duration_ms: i64,
        pool: &sqlx::PgPool,
    ) -> Result<Vec<Self>> {
        let jobs = sqlx::query_as::<_, Self>(
            r#"
            WITH next_jobs AS (
                SELECT id
                FROM jobs
                WHERE
                    (status = 'pending' AND enabled = true AND (next_run_at IS NULL OR next_run_at <= NOW()) AND retry_count < max_retries)
                    OR (status = 'running' AND lease_expires_at < NOW())
                ORDER BY priority, COALESCE(next_run_at, created_at)
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET
                status = 'running',
                last_run_at = NOW(),
                lease_expires_at = NOW() + ($2 || ' milliseconds')::INTERVAL,
                worker_id = $3,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_jobs)
            RETURNING id, job_type, next_run_at, last_run_at, args, priority,
                      max_retries, retry_count, attempt, timeout_ms, lease_duration_ms,
                      lease_expires_at, worker_id, status, enabled, error_message, error_kind,
                      dead_lettered_at, dead_letter_reason, root_job_id, created_at, updated_at
            "#,
        )
        .bind(limit)
        .bind(lease_duration_ms.to_string())
        .bind(worker_id)
        .fetch_all(pool)
        .await?;

        Ok(jobs)
    }

    /// Build a retry job chained to this one, scheduled for `scheduled_for`.
    pub fn create_retry(&self, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_type: self.job_type.clone(),
            next_run_at: Some(scheduled_for),
            last_run_at: None,
            args: self.args.clone(),
            priority: self.priority,
            max_retries: self.max_retries,
            retry_count: self.retry_count + 1,
            attempt: self.attempt + 1,
            timeout_ms: self.timeout_ms,
            lease_duration_ms: self.lease_duration_ms,
            lease_expires_at: None,
            worker_id: None,
            status: JobStatus::Pending,
            enabled: true,
            error_message: None,
            error_kind: None,
            dead_lettered_at: None,
            dead_letter_reason: None,
            root_job_id: self.root_job_id.or(Some(self.id)),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub async fn mark_dead_letter(&mut self, reason: &str, pool: &sqlx::PgPool) -> Result<()> {
        self.status = JobStatus::DeadLetter;
        self.dead_lettered_at = Some(Utc::now());
        self.dead_letter_reason = Some(reason.to_string());
        self.update(pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Record for Job {
    const TABLE: &'static str = "jobs";
    type Id = Uuid;

    async fn find_by_id(id: Uuid, pool: &sqlx::PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, job_type, next_run_at, last_run_at, args, priority,
                   max_retries, retry_count, attempt, timeout_ms, lease_duration_ms,
                   lease_expires_at, worker_id, status, enabled, error_message, error_kind,
                   dead_lettered_at, dead_letter_reason, root_job_id, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;

        Ok(job)
    }

    async fn insert(&self, pool: &sqlx::PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO jobs (
                id, job_type, next_run_at, last_run_at, args, priority,
                max_retries, retry_count, attempt, timeout_ms, lease_duration_ms,
                lease_expires_at, worker_id, status, enabled, error_message, error_kind,
                dead_lettered_at, dead_letter_reason, root_job_id, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22
            )
            RETURNING id, job_type, next_run_at, last_run_at, args, priority,
                      max_retries, retry_count, attempt, timeout_ms, lease_duration_ms,
                      lease_expires_at, worker_id, status, enabled, error_message, error_kind,
                      dead_lettered_at, dead_letter_reason, root_job_id, created_at, updated_at
            "#,
        )
        .bind(self.id)
        .bind(&self.job_type)
        .bind(self.next_run_at)
        .bind(self.last_run_at)
        .bind(&self.args)
        .bind(self.priority)
        .bind(self.max_retries)
        .bind(self.retry_count)
        .bind(self.attempt)
        .bind(self.timeout_ms)
        .bind(self.lease_duration_ms)
        .bind(self.lease_expires_at)
        .bind(&self.worker_id)
        .bind(self.status)
        .bind(self.enabled)
        .bind(&self.error_message)
        .bind(self.error_kind)
        .bind(self.dead_lettered_at)
        .bind(&self.dead_letter_reason)
        .bind(self.root_job_id)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await?;

        Ok(job)
    }

    async fn update(&self, pool: &sqlx::PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, Self>(
            r#"
            UPDATE jobs SET
                job_type = $1, next_run_at = $2, last_run_at = $3, args = $4, priority = $5,
                max_retries = $6, retry_count = $7, attempt = $8, timeout_ms = $9, lease_duration_ms = $10,
                lease_expires_at = $11, worker_id = $12, status = $13, enabled = $14,
                error_message = $15, error_kind = $16, dead_lettered_at = $17, dead_letter_reason = $18,
                root_job_id = $19, updated_at = NOW()
            WHERE id = $20
            RETURNING id, job_type, next_run_at, last_run_at, args, priority,
                      max_retries, retry_count, attempt, timeout_ms, lease_duration_ms,
                      lease_expires_at, worker_id, status, enabled, error_message, error_kind,
                      dead_lettered_at, dead_letter_reason, root_job_id, created_at, updated_at
            "#,
        )
        .bind(&self.job_type)
        .bind(self.next_run_at)
        .bind(self.last_run_at)
        .bind(&self.args)
        .bind(self.priority)
        .bind(self.max_retries)
        .bind(self.retry_count)
        .bind(self.attempt)
        .bind(self.timeout_ms)
        .bind(self.lease_duration_ms)
        .bind(self.lease_expires_at)
        .bind(&self.worker_id)
        .bind(self.status)
        .bind(self.enabled)
        .bind(&self.error_message)
        .bind(self.error_kind)
        .bind(self.dead_lettered_at)
        .bind(&self.dead_letter_reason)
        .bind(self.root_job_id)
        .bind(self.id)
        .fetch_one(pool)
        .await?;

        Ok(job)
    }

    async fn delete(&self, pool: &sqlx::PgPool) -> Result<()> {
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(self.id)
            .execute(pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job() -> Job {
        Job::immediate("initiate_task", serde_json::json!({ "call_id": Uuid::now_v7() }))
    }

    #[test]
    fn new_job_has_default_max_retries_of_3() {
        assert_eq!(sample_job().max_retries, 3);
    }

    #[test]
    fn new_job_has_retry_count_of_0() {
        assert_eq!(sample_job().retry_count, 0);
    }

    #[test]
    fn new_job_starts_with_pending_status() {
        assert_eq!(sample_job().status, JobStatus::Pending);
    }

    #[test]
    fn new_job_has_normal_priority_by_default() {
        assert_eq!(sample_job().priority, JobPriority::Normal);
    }

    #[test]
    fn is_ready_pending_job_without_schedule() {
        assert!(sample_job().is_ready());
    }

    #[test]
    fn is_ready_disabled_job_is_not_ready() {
        let mut job = sample_job();
        job.enabled = false;
        assert!(!job.is_ready());
    }

    #[test]
    fn is_ready_running_job_is_not_ready() {
        let mut job = sample_job();
        job.status = JobStatus::Running;
        assert!(!job.is_ready());
    }

    #[test]
    fn is_ready_exhausted_retries_is_not_ready() {
        let mut job = sample_job();
        job.retry_count = job.max_retries;
        assert!(!job.is_ready());
    }

    #[test]
    fn retryable_error_should_retry() {
        assert!(ErrorKind::Retryable.should_retry());
        assert!(ErrorKind::Shutdown.should_retry());
    }

    #[test]
    fn non_retryable_error_should_not_retry() {
        assert!(!ErrorKind::NonRetryable.should_retry());
        assert!(!ErrorKind::Cancelled.should_retry());
    }

    #[test]
    fn priority_ordering_is_correct() {
        assert!(JobPriority::Critical.as_i16() < JobPriority::High.as_i16());
        assert!(JobPriority::High.as_i16() < JobPriority::Normal.as_i16());
        assert!(JobPriority::Normal.as_i16() < JobPriority::Low.as_i16());
    }

    #[test]
    fn create_retry_increments_attempt_and_retry_count() {
        let job = sample_job();
        let retry = job.create_retry(Utc::now());
        assert_eq!(retry.attempt, job.attempt + 1);
        assert_eq!(retry.retry_count, job.retry_count + 1);
        assert_eq!(retry.root_job_id, Some(job.id));
    }
}
