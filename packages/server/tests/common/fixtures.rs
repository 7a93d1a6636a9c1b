//! Fixture builders for integration tests: inserted directly through the
//! domain types rather than over HTTP, so a test can set up state without
//! coupling to the very routes it's exercising.

use orchestrator_core::common::sql::Record;
use orchestrator_core::domains::campaigns::Campaign;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn insert_campaign(pool: &PgPool, name: &str) -> Campaign {
    let campaign = Campaign::new(name.to_string(), None);
    campaign.insert(pool).await.expect("insert test campaign")
}

/// A phone number guaranteed to pass `phone::normalize` (10 digits).
pub fn unique_phone_number() -> String {
    let suffix: u32 = (Uuid::new_v4().as_u128() % 1_000_000) as u32;
    format!("1555{suffix:06}")
}
