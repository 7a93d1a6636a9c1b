//! CallRecord, DeadLetter, and DailyMetrics: the call-centric durable
//! entities (spec §3).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::sql::Record;
use crate::common::CallId;
use crate::kernel::app_context::AppContext;

/// The status alphabet from spec §3: INITIATED, PROCESSING, PICKED,
/// DISCONNECTED, RNR, FAILED, RETRYING, COMPLETED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "call_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum CallStatus {
    Initiated,
    Processing,
    Picked,
    Disconnected,
    Rnr,
    Failed,
    Retrying,
    Completed,
}

impl CallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Failed)
    }

    pub fn from_callback_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PICKED" => Some(CallStatus::Picked),
            "DISCONNECTED" => Some(CallStatus::Disconnected),
            "RNR" => Some(CallStatus::Rnr),
            "FAILED" => Some(CallStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CallRecord {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub phone_number: String,
    pub status: CallStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub last_attempt_at: DateTime<Utc>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub external_call_id: Option<String>,
    pub error_message: Option<String>,
    pub total_call_time_seconds: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn new(campaign_id: Uuid, phone_number: String, max_attempts: i32) -> Self {
        let now = Utc::now();
        Self {
            id: CallId::new().into_uuid(),
            campaign_id,
            phone_number,
            status: CallStatus::Initiated,
            // Creation is itself the first attempt (original's call creation
            // starts attempt_count at 1, not 0; spec §4.2 literal scenario 2
            // only reaches attempt_count=2 after one RetryTicker increment).
            attempt_count: 1,
            max_attempts,
            last_attempt_at: now,
            next_retry_at: None,
            external_call_id: None,
            error_message: None,
            total_call_time_seconds: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Load a call record with `SELECT ... FOR UPDATE`, holding the row
    /// lock for the duration of the caller's transaction so lifecycle
    /// transitions never race (spec §4.2).
    pub async fn find_for_update(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<Self> {
        let record = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, campaign_id, phone_number, status, attempt_count, max_attempts, last_attempt_at,
                   next_retry_at, external_call_id, error_message, total_call_time_seconds,
                   created_at, updated_at
            FROM call_records
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(record)
    }

    /// Calls eligible for a retry pass: non-terminal, `next_retry_at` due,
    /// ordered as spec §4.5 requires (next_retry_at, then created_at, then
    /// call_id lexicographic) for deterministic tie-breaking.
    pub async fn find_due_for_retry(ctx: &AppContext, batch_size: i64) -> Result<Vec<Self>> {
        let records = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, campaign_id, phone_number, status, attempt_count, max_attempts, last_attempt_at,
                   next_retry_at, external_call_id, error_message, total_call_time_seconds,
                   created_at, updated_at
            FROM call_records
            WHERE status IN ('DISCONNECTED', 'RNR') AND next_retry_at IS NOT NULL AND next_retry_at <= NOW()
            ORDER BY next_retry_at ASC, created_at ASC, id ASC
            LIMIT $1
            "#,
        )
        .bind(batch_size)
        .fetch_all(&ctx.db_pool)
        .await?;
        Ok(records)
    }

    /// Sweep non-terminal records that have exhausted their attempts.
    pub async fn find_exhausted(ctx: &AppContext) -> Result<Vec<Self>> {
        let records = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, campaign_id, phone_number, status, attempt_count, max_attempts, last_attempt_at,
                   next_retry_at, external_call_id, error_message, total_call_time_seconds,
                   created_at, updated_at
            FROM call_records
            WHERE status NOT IN ('COMPLETED', 'FAILED') AND attempt_count >= max_attempts
            "#,
        )
        .fetch_all(&ctx.db_pool)
        .await?;
        Ok(records)
    }

    /// Delete terminal records older than `retention_days` (spec §3
    /// 30-day cleanup sweep).
    pub async fn delete_terminal_older_than(ctx: &AppContext, retention_days: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM call_records
            WHERE status IN ('COMPLETED', 'FAILED')
              AND updated_at < NOW() - ($1 || ' days')::INTERVAL
            "#,
        )
        .bind(retention_days.to_string())
        .execute(&ctx.db_pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Record for CallRecord {
    const TABLE: &'static str = "call_records";
    type Id = Uuid;

    async fn find_by_id(id: Uuid, pool: &sqlx::PgPool) -> Result<Self> {
        let record = sqlx::query_as::<_, Self>(
            r#"
            SELECT id, campaign_id, phone_number, status, attempt_count, max_attempts, last_attempt_at,
                   next_retry_at, external_call_id, error_message, total_call_time_seconds,
                   created_at, updated_at
            FROM call_records WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    async fn insert(&self, pool: &sqlx::PgPool) -> Result<Self> {
        let record = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO call_records (
                id, campaign_id, phone_number, status, attempt_count, max_attempts, last_attempt_at,
                next_retry_at, external_call_id, error_message, total_call_time_seconds,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, campaign_id, phone_number, status, attempt_count, max_attempts, last_attempt_at,
                      next_retry_at, external_call_id, error_message, total_call_time_seconds,
                      created_at, updated_at
            "#,
        )
        .bind(self.id)
        .bind(self.campaign_id)
        .bind(&self.phone_number)
        .bind(self.status)
        .bind(self.attempt_count)
        .bind(self.max_attempts)
        .bind(self.last_attempt_at)
        .bind(self.next_retry_at)
        .bind(&self.external_call_id)
        .bind(&self.error_message)
        .bind(self.total_call_time_seconds)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    async fn update(&self, pool: &sqlx::PgPool) -> Result<Self> {
        let record = sqlx::query_as::<_, Self>(
            r#"
            UPDATE call_records SET
                status = $1, attempt_count = $2, last_attempt_at = $3, next_retry_at = $4,
                external_call_id = $5, error_message = $6, total_call_time_seconds = $7, updated_at = NOW()
            WHERE id = $8
            RETURNING id, campaign_id, phone_number, status, attempt_count, max_attempts, last_attempt_at,
                      next_retry_at, external_call_id, error_message, total_call_time_seconds,
                      created_at, updated_at
            "#,
        )
        .bind(self.status)
        .bind(self.attempt_count)
        .bind(self.last_attempt_at)
        .bind(self.next_retry_at)
        .bind(&self.external_call_id)
        .bind(&self.error_message)
        .bind(self.total_call_time_seconds)
        .bind(self.id)
        .fetch_one(pool)
        .await?;
        Ok(record)
    }

    async fn delete(&self, pool: &sqlx::PgPool) -> Result<()> {
        sqlx::query("DELETE FROM call_records WHERE id = $1")
            .bind(self.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

/// Canonical DeadLetter schema: `error: String` only (spec.md Open
/// Question #3 resolved against the `error_message` alias).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeadLetter {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
    pub error: String,
    pub created_at: DateTime<Utc>,
}

impl DeadLetter {
    pub async fn list(ctx: &AppContext, limit: i64) -> Result<Vec<Self>> {
        let entries = sqlx::query_as::<_, Self>(
            "SELECT id, topic, payload, error, created_at FROM dead_letters ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&ctx.db_pool)
        .await?;
        Ok(entries)
    }

    /// Purge entries older than `retention_days` (spec.md Section C,
    /// grounded in the original's `cleanup_dlq.py`).
    pub async fn delete_older_than(ctx: &AppContext, retention_days: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dead_letters WHERE created_at < NOW() - ($1 || ' days')::INTERVAL")
            .bind(retention_days.to_string())
            .execute(&ctx.db_pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// A per-day counter row, updated in place as lifecycle transitions happen
/// rather than through a separate rollup job (spec.md Section C, grounded
/// in `MetricsManager.increment_call_status_count`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyMetrics {
    pub date: NaiveDate,
    pub total_calls_initiated: i64,
    pub total_picked: i64,
    pub total_disconnected: i64,
    pub total_rnr: i64,
    pub total_failed: i64,
    pub total_retries: i64,
    pub peak_concurrent_calls: i32,
}

impl DailyMetrics {
    /// The last `days` rows, most recent first, for the `/metrics` endpoint.
    pub async fn recent(ctx: &AppContext, days: i64) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, Self>(
            "SELECT date, total_calls_initiated, total_picked, total_disconnected, total_rnr,
                    total_failed, total_retries, peak_concurrent_calls
             FROM daily_metrics ORDER BY date DESC LIMIT $1",
        )
        .bind(days)
        .fetch_all(&ctx.db_pool)
        .await?;
        Ok(rows)
    }

    /// Bump the counter for `status` and take the max for
    /// `peak_concurrent_calls`, in the same transaction as the lifecycle
    /// transition that produced it.
    pub async fn record_transition(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        status: CallStatus,
        current_concurrent: i32,
    ) -> Result<()> {
        let column = match status {
            CallStatus::Initiated => "total_calls_initiated",
            CallStatus::Picked => "total_picked",
            CallStatus::Disconnected => "total_disconnected",
            CallStatus::Rnr => "total_rnr",
            CallStatus::Failed => "total_failed",
            CallStatus::Retrying => "total_retries",
            CallStatus::Processing | CallStatus::Completed => return Ok(()),
        };

        let query = format!(
            r#"
            INSERT INTO daily_metrics (date, {column}, peak_concurrent_calls)
            VALUES (CURRENT_DATE, 1, $1)
            ON CONFLICT (date) DO UPDATE SET
                {column} = daily_metrics.{column} + 1,
                peak_concurrent_calls = GREATEST(daily_metrics.peak_concurrent_calls, EXCLUDED.peak_concurrent_calls)
            "#
        );

        sqlx::query(&query)
            .bind(current_concurrent)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_completed_and_failed() {
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(!CallStatus::Retrying.is_terminal());
        assert!(!CallStatus::Picked.is_terminal());
    }

    #[test]
    fn callback_status_parsing_accepts_known_values() {
        assert_eq!(CallStatus::from_callback_str("picked"), Some(CallStatus::Picked));
        assert_eq!(CallStatus::from_callback_str("RNR"), Some(CallStatus::Rnr));
    }

    #[test]
    fn callback_status_parsing_rejects_unknown_values() {
        assert_eq!(CallStatus::from_callback_str("BUSY"), None);
    }
}
