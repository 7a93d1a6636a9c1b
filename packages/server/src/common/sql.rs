//! The shared CRUD trait every durable entity implements against Postgres.

use anyhow::Result;
use async_trait::async_trait;

/// A durable entity backed by a single Postgres table.
///
/// Implementors name their table once (`TABLE`) and their primary key type
/// (`Id`). Every method takes a bare pool reference rather than the full
/// `AppContext` — persistence never needs more than the pool, and several
/// components (the job queue, the admission reservation row) have to insert
/// rows before an `AppContext` wrapping them even exists.
#[async_trait]
pub trait Record: Sized + Send + Sync {
    const TABLE: &'static str;
    type Id: Send + Sync;

    async fn find_by_id(id: Self::Id, pool: &sqlx::PgPool) -> Result<Self>;

    async fn insert(&self, pool: &sqlx::PgPool) -> Result<Self>;

    async fn update(&self, pool: &sqlx::PgPool) -> Result<Self>;

    async fn delete(&self, pool: &sqlx::PgPool) -> Result<()>;

    async fn read(&self, id: Self::Id, pool: &sqlx::PgPool) -> Result<Self> {
        Self::find_by_id(id, pool).await
    }
}
