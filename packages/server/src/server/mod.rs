// HTTP server setup (Axum)
pub mod app;
pub mod middleware;
pub mod routes;

pub use app::{
    build_context, build_router, spawn_job_runner, spawn_queue_processor, spawn_retry_ticker,
    spawn_scheduled_tasks, AppState,
};
