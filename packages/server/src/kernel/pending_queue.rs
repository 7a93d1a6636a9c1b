//! PendingQueue: the ordered wait list calls sit in when no slot is
//! available at admission time (spec §2.4, §4.4).
//!
//! Backed by Postgres so queue state survives a restart. Queues are scoped
//! per campaign: ordering is priority descending, then FIFO (queued_at
//! ascending) within a priority, ties broken by insertion id. There is no
//! ordering guarantee *across* campaigns.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::common::{CallId, CampaignId, PhoneNumberId};

#[derive(Debug, Clone, FromRow)]
pub struct QueueEntry {
    pub id: Uuid,
    pub call_id: Uuid,
    pub campaign_id: Uuid,
    pub phone_number_id: Uuid,
    pub phone_number: String,
    pub priority: i32,
    pub queued_at: DateTime<Utc>,
}

pub struct PendingQueue {
    pool: PgPool,
}

impl PendingQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a call to the tail of its campaign's queue.
    pub async fn push_back(
        &self,
        call_id: CallId,
        campaign_id: CampaignId,
        phone_number_id: PhoneNumberId,
        phone_number: &str,
        priority: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_entries (id, call_id, campaign_id, phone_number_id, phone_number, priority, queued_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(call_id.into_uuid())
        .bind(campaign_id.into_uuid())
        .bind(phone_number_id.into_uuid())
        .bind(phone_number)
        .bind(priority)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Atomically pop up to `n` entries from the head of a campaign's queue
    /// (priority descending, then oldest `queued_at` first), removing them
    /// from the table.
    pub async fn pop_front_n(&self, campaign_id: CampaignId, n: i64) -> Result<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(
            r#"
            WITH popped AS (
                SELECT id
                FROM queue_entries
                WHERE campaign_id = $1
                ORDER BY priority DESC, queued_at ASC, id ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            DELETE FROM queue_entries
            WHERE id IN (SELECT id FROM popped)
            RETURNING id, call_id, campaign_id, phone_number_id, phone_number, priority, queued_at
            "#,
        )
        .bind(campaign_id.into_uuid())
        .bind(n)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn size(&self, campaign_id: CampaignId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries WHERE campaign_id = $1")
            .bind(campaign_id.into_uuid())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn clear(&self, campaign_id: CampaignId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE campaign_id = $1")
            .bind(campaign_id.into_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Total entries waiting across every campaign.
    pub async fn total_size(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Campaigns with at least one entry currently waiting, oldest entry
    /// first so `QueueProcessor` drains longest-waiting campaigns first.
    pub async fn campaigns_with_entries(&self) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT campaign_id
            FROM queue_entries
            GROUP BY campaign_id
            ORDER BY MIN(queued_at) ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
