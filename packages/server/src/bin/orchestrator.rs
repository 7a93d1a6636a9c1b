//! Single binary, four subcommands: `serve` runs everything in one process;
//! `worker`, `ticker`, and `queue-drainer` run a subset standalone so the
//! same deploy artifact can be split across processes in production (spec
//! §9 redesign flag).

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use orchestrator_core::config::Config;
use orchestrator_core::kernel::{retry_ticker, QueueProcessor};
use orchestrator_core::server::{
    build_context, build_router, spawn_job_runner, spawn_queue_processor, spawn_retry_ticker,
    spawn_scheduled_tasks,
};

#[derive(Parser)]
#[command(name = "orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API plus every background loop in one process.
    Serve,
    /// Run only the TaskBus job runner (`initiate_task` dispatch).
    Worker,
    /// Run only the retry ticker and the cron-driven sweeps.
    Ticker,
    /// Run only the PendingQueue drainer.
    QueueDrainer,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let (ctx, job_queue) = build_context(config).await?;

    match cli.command {
        Command::Serve => {
            spawn_job_runner(ctx.clone(), job_queue);
            spawn_queue_processor(ctx.clone());
            spawn_retry_ticker(ctx.clone());
            let _scheduler = spawn_scheduled_tasks(ctx.clone()).await?;

            let port = ctx.config.port;
            let router = build_router(ctx);
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
            info!(port, "orchestrator listening");
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
            )
            .await?;
        }
        Command::Worker => {
            info!("running job runner standalone");
            spawn_job_runner(ctx, job_queue);
            std::future::pending::<()>().await;
        }
        Command::Ticker => {
            info!("running retry ticker and scheduled sweeps standalone");
            let _scheduler = spawn_scheduled_tasks(ctx.clone()).await?;
            retry_ticker::run(ctx).await?;
        }
        Command::QueueDrainer => {
            info!("running queue processor standalone");
            let processor = QueueProcessor::new(ctx.queue_notify.clone());
            processor.run(ctx).await;
        }
    }

    Ok(())
}
