//! Application setup and server configuration.
//!
//! Builds the axum router plus the three background loops (`JobRunner`,
//! `QueueProcessor`, `RetryTicker`) and the cron-driven sweeps, all sharing
//! one [`AppContext`] (spec §9 redesign flag in place of the old
//! `ServerKernel`/`ServerDeps` globals).

use std::sync::Arc;

use axum::http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use axum::http::Method;
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use provider_client::{CallInitiator, ProviderClient, ProviderOptions};
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::config::Config;
use crate::kernel::jobs::{registry_with_handlers, JobRegistry, JobRunner, PostgresJobQueue};
use crate::kernel::{AppContext, PendingQueue, QueueProcessor, ScheduleOracle, SlotRegistry};
use crate::kernel::{retry_ticker, scheduled_tasks};
use crate::server::middleware::auth_middleware;
use crate::server::routes::{calls, campaigns, health};

/// State handed to every axum handler. Thin by design: everything a handler
/// needs hangs off `ctx`.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
}

/// Build the Postgres pool, Redis connection manager, and every component
/// that hangs off [`AppContext`], in the order that avoids the
/// `PostgresJobQueue`/`AppContext` circular dependency: the job queue is
/// built from a bare pool first, `AppContext` second, and the queue handle
/// cloned into the things that need it standalone (the job runner).
pub async fn build_context(config: Config) -> anyhow::Result<(Arc<AppContext>, Arc<PostgresJobQueue>)> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let redis_client = redis::Client::open(config.redis_url.clone())?;
    let redis_conn = ConnectionManager::new(redis_client).await?;

    let provider: Arc<dyn CallInitiator> = Arc::new(ProviderClient::new(ProviderOptions {
        base_url: config.provider_base_url.clone(),
        api_key: config.provider_api_key.clone(),
    }));

    let slots = Arc::new(SlotRegistry::new(
        redis_conn,
        config.max_concurrent_calls,
        config.duplicate_call_window_minutes,
    ));
    let queue = Arc::new(PendingQueue::new(pool.clone()));
    let schedule = Arc::new(ScheduleOracle::load(config.retry_schedule_path.clone()).await?);
    let job_queue = Arc::new(PostgresJobQueue::new(pool.clone()));

    let ctx = Arc::new(AppContext {
        db_pool: pool,
        provider,
        slots,
        queue,
        schedule,
        job_queue: job_queue.clone(),
        config: Arc::new(config),
        queue_notify: Arc::new(tokio::sync::Notify::new()),
    });

    Ok((ctx, job_queue))
}

/// Spawn the worker-side background loops: the job runner, the queue
/// processor, the retry ticker, and the cron sweeps. Shared by the `serve`
/// subcommand (everything in one process) and the standalone `worker`/
/// `ticker` subcommands (a subset each).
pub fn spawn_job_runner(ctx: Arc<AppContext>, job_queue: Arc<PostgresJobQueue>) {
    let registry: JobRegistry = registry_with_handlers();
    let runner = JobRunner::new(job_queue, Arc::new(registry), ctx);
    tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            error!(error = %e, "job runner exited with error");
        }
    });
}

pub fn spawn_queue_processor(ctx: Arc<AppContext>) {
    let processor = QueueProcessor::new(ctx.queue_notify.clone());
    tokio::spawn(processor.run(ctx));
}

pub fn spawn_retry_ticker(ctx: Arc<AppContext>) {
    tokio::spawn(async move {
        if let Err(e) = retry_ticker::run(ctx).await {
            error!(error = %e, "retry ticker exited with error");
        }
    });
}

pub async fn spawn_scheduled_tasks(
    ctx: Arc<AppContext>,
) -> anyhow::Result<tokio_cron_scheduler::JobScheduler> {
    scheduled_tasks::start_scheduler(ctx).await
}

/// Build the axum router. Auth, CORS, and tracing are applied as layers;
/// rate limiting is production-only (dev traffic all shares one IP, which
/// the governor would otherwise throttle into uselessness).
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let state = AppState { ctx };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, HeaderName::from_static("x-auth-token")]);

    #[cfg(not(debug_assertions))]
    let rate_limit_layer = {
        let rate_limit_config = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(10)
                .burst_size(20)
                .use_headers()
                .finish()
                .expect("rate limiter configuration is valid and should never fail"),
        );
        GovernorLayer {
            config: rate_limit_config,
        }
    };

    let router = Router::new()
        .route("/campaigns", post(campaigns::create_campaign))
        .route("/campaigns", get(campaigns::list_campaigns))
        .route("/campaigns/:id", get(campaigns::get_campaign))
        .route("/phone-numbers", post(campaigns::add_phone_numbers))
        .route("/initiate-call", post(calls::initiate_call))
        .route("/bulk-initiate-calls", post(calls::bulk_initiate_calls))
        .route("/callback", put(calls::callback))
        .route("/metrics", get(calls::metrics))
        .route("/health", get(health::health_handler));

    // auth_middleware excludes /health (and /docs, /admin) internally, so
    // route order relative to this layer doesn't matter.
    #[cfg(not(debug_assertions))]
    let router = router.layer(rate_limit_layer);

    router
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
