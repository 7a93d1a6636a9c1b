//! Test harness with testcontainers for integration testing.
//!
//! Shared Postgres and Redis containers persist across all tests in the
//! binary; migrations run once on first use. Each test gets its own
//! [`AppContext`] (and therefore its own Redis slot counter key space is
//! still shared, so tests that care about concurrency limits use a small,
//! test-local `max_concurrent_calls`).

use std::sync::Arc;

use anyhow::{Context, Result};
use orchestrator_core::config::Config;
use orchestrator_core::kernel::AppContext;
use orchestrator_core::server::{build_context, build_router};
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;
use tower::ServiceExt;

pub const TEST_AUTH_TOKEN: &str = "test-auth-token";

struct SharedTestInfra {
    db_url: String,
    redis_url: String,
    _postgres: ContainerAsync<Postgres>,
    _redis: ContainerAsync<Redis>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .start()
            .await
            .context("failed to start postgres container")?;
        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgres://postgres:postgres@{pg_host}:{pg_port}/postgres");

        let redis = Redis::default()
            .start()
            .await
            .context("failed to start redis container")?;
        let redis_host = redis.get_host().await?;
        let redis_port = redis.get_host_port_ipv4(6379).await?;
        let redis_url = format!("redis://{redis_host}:{redis_port}");

        Ok(Self {
            db_url,
            redis_url,
            _postgres: postgres,
            _redis: redis,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async { Self::init().await.expect("failed to start shared test infra") })
            .await
    }
}

pub struct TestHarness {
    pub ctx: Arc<AppContext>,
    pub router: axum::Router,
}

impl TestHarness {
    /// Build a harness against the shared containers, with
    /// `max_concurrent_calls` set low enough that capacity-exhaustion tests
    /// don't need to create dozens of calls.
    pub async fn new(max_concurrent_calls: u32) -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let config = Config {
            database_url: infra.db_url.clone(),
            redis_url: infra.redis_url.clone(),
            port: 0,
            auth_token: TEST_AUTH_TOKEN.to_string(),
            provider_base_url: "http://localhost:0".to_string(),
            provider_api_key: "unused".to_string(),
            retry_schedule_path: concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/retry_schedule.yaml")
                .to_string(),
            max_concurrent_calls,
            max_retry_attempts: 3,
            duplicate_call_window_minutes: 30,
            scheduler_interval_minutes: 1,
            dlq_retention_days: 30,
        };

        // Route-level tests never spawn the job runner, so the provider
        // client is built but never dialed.
        let (ctx, _job_queue) = build_context(config).await?;
        let router = build_router(ctx.clone());
        Ok(Self { ctx, router })
    }

    /// Truncate every table and flush Redis between tests so each test
    /// starts from a clean slate while still reusing the same containers.
    /// The slot counter and duplicate locks live in the shared Redis
    /// container, not per-harness state, so tests that assert on exact
    /// concurrency counts must call this first.
    pub async fn reset(&self) -> Result<()> {
        sqlx::query(
            "TRUNCATE campaigns, phone_numbers, call_records, queue_entries, dead_letters, \
             daily_metrics, jobs, slot_holdings RESTART IDENTITY CASCADE",
        )
        .execute(&self.ctx.db_pool)
        .await?;

        let client = redis::Client::open(self.ctx.config.redis_url.clone())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("FLUSHALL").query_async::<_, ()>(&mut conn).await?;

        Ok(())
    }

    pub fn db_pool(&self) -> &PgPool {
        &self.ctx.db_pool
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> (axum::http::StatusCode, serde_json::Value) {
        self.request(axum::http::Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> (axum::http::StatusCode, serde_json::Value) {
        self.request(axum::http::Method::PUT, path, Some(body)).await
    }

    pub async fn get(&self, path: &str) -> (axum::http::StatusCode, serde_json::Value) {
        self.request(axum::http::Method::GET, path, None).await
    }

    async fn request(
        &self,
        method: axum::http::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> (axum::http::StatusCode, serde_json::Value) {
        let body = match body {
            Some(v) => axum::body::Body::from(serde_json::to_vec(&v).unwrap()),
            None => axum::body::Body::empty(),
        };

        let request = axum::http::Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .header("x-auth-token", TEST_AUTH_TOKEN)
            .body(body)
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }
}
