//! Campaign and PhoneNumber: the two durable entities a call always
//! belongs to (spec §3).

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::common::sql::Record;
use crate::common::{CampaignId, PhoneNumberId};
use crate::kernel::app_context::AppContext;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(name: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: CampaignId::new().into_uuid(),
            name,
            description,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn list(ctx: &AppContext) -> Result<Vec<Self>> {
        let campaigns = sqlx::query_as::<_, Self>(
            "SELECT id, name, description, is_active, created_at, updated_at FROM campaigns ORDER BY created_at DESC",
        )
        .fetch_all(&ctx.db_pool)
        .await?;
        Ok(campaigns)
    }
}

#[async_trait]
impl Record for Campaign {
    const TABLE: &'static str = "campaigns";
    type Id = Uuid;

    async fn find_by_id(id: Uuid, pool: &sqlx::PgPool) -> Result<Self> {
        let campaign = sqlx::query_as::<_, Self>(
            "SELECT id, name, description, is_active, created_at, updated_at FROM campaigns WHERE id = $1",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(campaign)
    }

    async fn insert(&self, pool: &sqlx::PgPool) -> Result<Self> {
        let campaign = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO campaigns (id, name, description, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, description, is_active, created_at, updated_at
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.description)
        .bind(self.is_active)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(pool)
        .await?;
        Ok(campaign)
    }

    async fn update(&self, pool: &sqlx::PgPool) -> Result<Self> {
        let campaign = sqlx::query_as::<_, Self>(
            r#"
            UPDATE campaigns SET name = $1, description = $2, is_active = $3, updated_at = NOW()
            WHERE id = $4
            RETURNING id, name, description, is_active, created_at, updated_at
            "#,
        )
        .bind(&self.name)
        .bind(&self.description)
        .bind(self.is_active)
        .bind(self.id)
        .fetch_one(pool)
        .await?;
        Ok(campaign)
    }

    async fn delete(&self, pool: &sqlx::PgPool) -> Result<()> {
        sqlx::query("DELETE FROM campaigns WHERE id = $1")
            .bind(self.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

/// A phone number scoped to a campaign. `campaign_id` + `number` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PhoneNumber {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub number: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl PhoneNumber {
    pub fn new(campaign_id: CampaignId, number: String) -> Self {
        Self {
            id: PhoneNumberId::new().into_uuid(),
            campaign_id: campaign_id.into_uuid(),
            number,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Every active number on file for `campaign_id`, for
    /// `use_campaign_numbers: true` bulk-initiate requests.
    pub async fn list_for_campaign(ctx: &AppContext, campaign_id: Uuid) -> Result<Vec<Self>> {
        let numbers = sqlx::query_as::<_, Self>(
            "SELECT id, campaign_id, number, is_active, created_at FROM phone_numbers
             WHERE campaign_id = $1 AND is_active = TRUE ORDER BY created_at ASC",
        )
        .bind(campaign_id)
        .fetch_all(&ctx.db_pool)
        .await?;
        Ok(numbers)
    }
}

#[async_trait]
impl Record for PhoneNumber {
    const TABLE: &'static str = "phone_numbers";
    type Id = Uuid;

    async fn find_by_id(id: Uuid, pool: &sqlx::PgPool) -> Result<Self> {
        let number = sqlx::query_as::<_, Self>(
            "SELECT id, campaign_id, number, is_active, created_at FROM phone_numbers WHERE id = $1",
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(number)
    }

    async fn insert(&self, pool: &sqlx::PgPool) -> Result<Self> {
        let number = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO phone_numbers (id, campaign_id, number, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (campaign_id, number) DO UPDATE SET is_active = EXCLUDED.is_active
            RETURNING id, campaign_id, number, is_active, created_at
            "#,
        )
        .bind(self.id)
        .bind(self.campaign_id)
        .bind(&self.number)
        .bind(self.is_active)
        .bind(self.created_at)
        .fetch_one(pool)
        .await?;
        Ok(number)
    }

    async fn update(&self, pool: &sqlx::PgPool) -> Result<Self> {
        let number = sqlx::query_as::<_, Self>(
            "UPDATE phone_numbers SET is_active = $1 WHERE id = $2 RETURNING id, campaign_id, number, is_active, created_at",
        )
        .bind(self.is_active)
        .bind(self.id)
        .fetch_one(pool)
        .await?;
        Ok(number)
    }

    async fn delete(&self, pool: &sqlx::PgPool) -> Result<()> {
        sqlx::query("DELETE FROM phone_numbers WHERE id = $1")
            .bind(self.id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
